//! Language profile registry
//!
//! Maps a language identifier to the recipe used to run it inside the
//! sandbox image. Profiles are static data shared by every request.

use crate::{Result, SandcastleError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directory inside the container the artifact is mounted into
pub const MOUNT_DIR: &str = "/app";

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    C,
    Cpp,
    Java,
    Rust,
}

/// How to build and run one artifact inside the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// File name the code is written to (and mounted as, under [`MOUNT_DIR`])
    pub artifact_file_name: &'static str,
    /// Optional compile step, run before `run_command`
    pub compile_command: Option<&'static [&'static str]>,
    /// Command that runs the program
    pub run_command: &'static [&'static str],
}

const PYTHON: LanguageProfile = LanguageProfile {
    artifact_file_name: "main.py",
    compile_command: None,
    run_command: &["python3", "-u", "/app/main.py"],
};

const JAVASCRIPT: LanguageProfile = LanguageProfile {
    artifact_file_name: "main.js",
    compile_command: None,
    run_command: &["node", "/app/main.js"],
};

const C: LanguageProfile = LanguageProfile {
    artifact_file_name: "main.c",
    compile_command: Some(&["gcc", "-O2", "-o", "/tmp/main", "/app/main.c", "-lm"]),
    run_command: &["/tmp/main"],
};

const CPP: LanguageProfile = LanguageProfile {
    artifact_file_name: "main.cpp",
    compile_command: Some(&["g++", "-O2", "-o", "/tmp/main", "/app/main.cpp"]),
    run_command: &["/tmp/main"],
};

const JAVA: LanguageProfile = LanguageProfile {
    artifact_file_name: "Main.java",
    compile_command: Some(&["javac", "-d", "/tmp", "/app/Main.java"]),
    run_command: &["java", "-cp", "/tmp", "Main"],
};

const RUST: LanguageProfile = LanguageProfile {
    artifact_file_name: "main.rs",
    compile_command: Some(&["rustc", "-O", "-o", "/tmp/main", "/app/main.rs"]),
    run_command: &["/tmp/main"],
};

impl Language {
    /// Every language the service accepts
    pub const ALL: [Self; 6] = [
        Self::Python,
        Self::JavaScript,
        Self::C,
        Self::Cpp,
        Self::Java,
        Self::Rust,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::Rust => "rust",
        }
    }

    #[must_use]
    pub const fn profile(self) -> &'static LanguageProfile {
        match self {
            Self::Python => &PYTHON,
            Self::JavaScript => &JAVASCRIPT,
            Self::C => &C,
            Self::Cpp => &CPP,
            Self::Java => &JAVA,
            Self::Rust => &RUST,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Language {
    type Err = SandcastleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Self::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Self::JavaScript),
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            "rust" | "rs" => Ok(Self::Rust),
            _ => Err(SandcastleError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl LanguageProfile {
    /// Command line the container runs: compile-then-run through `sh -c`
    /// when there is a compile step, the bare run command otherwise.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        match self.compile_command {
            Some(compile) => vec![
                "sh".into(),
                "-c".into(),
                format!("{} && {}", compile.join(" "), self.run_command.join(" ")),
            ],
            None => self.run_command.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Look up the profile for a language identifier.
pub fn lookup(language: &str) -> Result<&'static LanguageProfile> {
    language.parse::<Language>().map(Language::profile)
}
