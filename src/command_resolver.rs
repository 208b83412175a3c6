//! Command resolver: resolves a test's `program_command` parameter to a
//! concrete shell command for the submission's language.

use std::collections::HashMap;

use serde_json::Value;

use crate::submission::Language;

/// The three shapes a `program_command` parameter may take.
#[derive(Debug, Clone)]
pub enum CommandSpec {
    /// Legacy: used verbatim regardless of language.
    Literal(String),
    /// Looked up by the submission's language, case-insensitively.
    ByLanguage(HashMap<String, String>),
    /// The literal string `"CMD"`: auto-derive from language + filename.
    AutoResolve,
}

/// Parses a raw `program_command` parameter value into a [`CommandSpec`].
pub fn parse_command_spec(value: &Value) -> Option<CommandSpec> {
    match value {
        Value::String(s) if s == "CMD" => Some(CommandSpec::AutoResolve),
        Value::String(s) => Some(CommandSpec::Literal(s.clone())),
        Value::Object(map) => {
            let map = map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.to_lowercase(), s.to_string())))
                .collect();
            Some(CommandSpec::ByLanguage(map))
        }
        _ => None,
    }
}

/// Resolves a [`CommandSpec`] to a concrete shell command for `language`,
/// given an optional fallback filename (e.g. the test's `file_target`,
/// when singular).
pub fn resolve_command(spec: &CommandSpec, language: Language, filename: Option<&str>) -> Option<String> {
    match spec {
        CommandSpec::Literal(cmd) => Some(cmd.clone()),
        CommandSpec::ByLanguage(map) => map.get(language.key()).cloned(),
        CommandSpec::AutoResolve => Some(auto_resolve(language, filename)),
    }
}

fn auto_resolve(language: Language, filename: Option<&str>) -> String {
    match language {
        Language::Python => match filename {
            Some(f) => format!("python3 {f}"),
            None => "python3 main.py".to_string(),
        },
        Language::Java => match filename {
            Some(f) => format!("java {}", f.trim_end_matches(".java")),
            None => "java Main".to_string(),
        },
        Language::Node => match filename {
            Some(f) => format!("node {f}"),
            None => "node index.js".to_string(),
        },
        Language::Cpp => match filename {
            Some(f) => format!("./{}", f.trim_end_matches(".cpp")),
            None => "./a.out".to_string(),
        },
        Language::None => String::new(),
    }
}
