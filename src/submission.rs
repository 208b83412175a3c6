//! Submission data model: the bag of files and language a student hands in.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Target language of a submission, and by extension the sandbox image
/// and preflight/command-resolution rules that apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Node,
    Cpp,
    /// No language declared; submission skips preflight and sandboxing.
    None,
}

impl Language {
    /// The Docker image used to sandbox this language. Unused for `None`.
    pub fn image(&self) -> &'static str {
        match self {
            Language::Python => "sandbox-py:latest",
            Language::Java => "sandbox-java:latest",
            Language::Node => "sandbox-node:latest",
            Language::Cpp => "sandbox-cpp:latest",
            Language::None => "",
        }
    }

    /// Lowercase key used for config-map lookups (`setup_config["python"]`,
    /// command-resolver dictionaries, etc).
    pub fn key(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Node => "node",
            Language::Cpp => "cpp",
            Language::None => "none",
        }
    }

    /// Case-insensitive lookup by key, used when resolving a mapping keyed
    /// by language name from instructor-authored config.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "node" => Some(Language::Node),
            "cpp" => Some(Language::Cpp),
            "none" => Some(Language::None),
            _ => None,
        }
    }

    /// All sandboxable languages (excludes `None`), used to enumerate pools.
    pub fn sandboxed() -> [Language; 4] {
        [Language::Python, Language::Java, Language::Node, Language::Cpp]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// An instructor-identified package of files plus target language.
///
/// Immutable once accepted into the pipeline: nothing downstream mutates
/// `files` or `language` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub username: String,
    pub user_id: u64,
    pub assignment_id: u64,
    /// filename -> raw file content.
    pub files: HashMap<String, String>,
    pub language: Language,
}

impl Submission {
    pub fn new(
        username: impl Into<String>,
        user_id: u64,
        assignment_id: u64,
        language: Language,
    ) -> Self {
        Self {
            username: username.into(),
            user_id,
            assignment_id,
            files: HashMap::new(),
            language,
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(name.into(), content.into());
        self
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}
