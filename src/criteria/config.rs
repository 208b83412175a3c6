//! Raw, as-authored criteria configuration: the JSON shape an instructor
//! writes, before weight normalization or test resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level criteria document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CriteriaConfig {
    pub test_library: Option<String>,
    pub base: CategoryConfig,
    #[serde(default)]
    pub bonus: Option<CategoryConfig>,
    #[serde(default)]
    pub penalty: Option<CategoryConfig>,
}

/// A `base`/`bonus`/`penalty` category: exactly one of `subjects`/`tests`
/// is expected to be populated; both-or-neither is a build-time error, not
/// a deserialization error (checked in `builder.rs` so the error carries
/// tree-path context).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CategoryConfig {
    pub weight: f64,
    #[serde(default)]
    pub subjects_weight: Option<f64>,
    #[serde(default)]
    pub subjects: Option<Vec<SubjectConfig>>,
    #[serde(default)]
    pub tests: Option<Vec<TestConfig>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubjectConfig {
    pub subject_name: String,
    pub weight: f64,
    #[serde(default)]
    pub subjects_weight: Option<f64>,
    #[serde(default)]
    pub subjects: Option<Vec<SubjectConfig>>,
    #[serde(default)]
    pub tests: Option<Vec<TestConfig>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default, rename = "file")]
    pub file_target: Option<FileTarget>,
    #[serde(default)]
    pub parameters: Option<ParametersConfig>,
}

/// The three shapes `file_target` may take in instructor-authored config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileTarget {
    One(String),
    Many(Vec<String>),
}

impl FileTarget {
    pub const ALL: &'static str = "all";

    pub fn is_all(&self) -> bool {
        matches!(self, FileTarget::One(s) if s == Self::ALL)
    }

    pub fn names(&self) -> Vec<String> {
        match self {
            FileTarget::One(s) => vec![s.clone()],
            FileTarget::Many(v) => v.clone(),
        }
    }
}

/// The three parameter shapes the builder collapses into a named mapping:
/// ordered list, named mapping, or `{name, value}` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParametersConfig {
    Named(std::collections::HashMap<String, Value>),
    NameValuePairs(Vec<NameValue>),
    Positional(Vec<Value>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NameValue {
    pub name: String,
    pub value: Value,
}
