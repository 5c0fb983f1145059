//! Image availability guard

use crate::runtime::ContainerRuntime;
use crate::{Result, SandboxConfig};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Makes sure the sandbox image exists before a container is created.
///
/// The presence check and the build are not atomic across requests. Without
/// single-flight, two first requests may both see the image missing and both
/// build it; the builds are idempotent and converge on the same tag. With
/// single-flight, builds queue behind one lock and re-check before building.
#[derive(Debug)]
pub struct ImageGuard {
    image: String,
    build_context: PathBuf,
    build_lock: Option<Mutex<()>>,
}

impl ImageGuard {
    #[must_use]
    pub fn new(image: impl Into<String>, build_context: impl Into<PathBuf>, single_flight: bool) -> Self {
        Self {
            image: image.into(),
            build_context: build_context.into(),
            build_lock: single_flight.then(|| Mutex::new(())),
        }
    }

    #[must_use]
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            config.image.clone(),
            config.build_context.clone(),
            config.single_flight_builds,
        )
    }

    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return once the image is present, building it if needed.
    pub async fn ensure(&self, runtime: &dyn ContainerRuntime) -> Result<()> {
        if runtime.image_exists(&self.image).await? {
            return Ok(());
        }

        match &self.build_lock {
            Some(lock) => {
                let _guard = lock.lock().await;
                if runtime.image_exists(&self.image).await? {
                    tracing::debug!(image = %self.image, "image built by a concurrent request");
                    return Ok(());
                }
                self.build(runtime).await
            }
            None => self.build(runtime).await,
        }
    }

    async fn build(&self, runtime: &dyn ContainerRuntime) -> Result<()> {
        tracing::warn!(image = %self.image, "sandbox image missing, building");
        runtime.build_image(&self.image, &self.build_context).await
    }
}
