//! Output classifier: maps `(stdout, stderr, exit_code, language)` to one
//! of five categories, in a fixed rule order.

use serde::{Deserialize, Serialize};

use crate::submission::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCategory {
    Success,
    RuntimeError,
    Timeout,
    CompilationError,
    SystemError,
}

const COMPILATION_MARKERS: [&str; 3] = ["error:", "javac", "g++"];

fn runtime_markers(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["Traceback"],
        Language::Java => &["Exception in thread", "java.lang."],
        Language::Node => &["ReferenceError:", "TypeError:", "Uncaught"],
        Language::Cpp => &["segmentation fault", "core dumped"],
        Language::None => &[],
    }
}

/// Classifies a sandbox command's outcome. Rule order matters: exit code
/// checks take priority over stderr content sniffing.
pub fn classify_output(stdout: &str, stderr: &str, exit_code: i32, language: Language) -> ResponseCategory {
    let _ = stdout;

    if exit_code == 0 {
        return ResponseCategory::Success;
    }
    if exit_code == 137 {
        return ResponseCategory::Timeout;
    }
    if COMPILATION_MARKERS.iter().any(|m| stderr.contains(m)) {
        return ResponseCategory::CompilationError;
    }
    let stderr_lower = stderr.to_lowercase();
    if runtime_markers(language)
        .iter()
        .any(|m| stderr.contains(m) || stderr_lower.contains(&m.to_lowercase()))
    {
        return ResponseCategory::RuntimeError;
    }
    ResponseCategory::SystemError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_on_zero_exit() {
        assert_eq!(
            classify_output("", "", 0, Language::Python),
            ResponseCategory::Success
        );
    }

    #[test]
    fn timeout_on_137() {
        assert_eq!(
            classify_output("", "", 137, Language::Python),
            ResponseCategory::Timeout
        );
    }

    #[test]
    fn compilation_error_takes_priority_over_runtime_markers() {
        // javac output also happens to not contain python markers, but this
        // checks the rule order holds for a compiled-language case.
        assert_eq!(
            classify_output("", "javac: error: cannot find symbol", 1, Language::Java),
            ResponseCategory::CompilationError
        );
    }

    #[test]
    fn python_traceback_is_runtime_error() {
        assert_eq!(
            classify_output("", "Traceback (most recent call last):", 1, Language::Python),
            ResponseCategory::RuntimeError
        );
    }

    #[test]
    fn java_exception_is_runtime_error() {
        assert_eq!(
            classify_output("", "Exception in thread \"main\" java.lang.NullPointerException", 1, Language::Java),
            ResponseCategory::RuntimeError
        );
    }

    #[test]
    fn node_reference_error_is_runtime_error() {
        assert_eq!(
            classify_output("", "ReferenceError: x is not defined", 1, Language::Node),
            ResponseCategory::RuntimeError
        );
    }

    #[test]
    fn cpp_segfault_is_runtime_error() {
        assert_eq!(
            classify_output("", "Segmentation fault (core dumped)", 139, Language::Cpp),
            ResponseCategory::RuntimeError
        );
    }

    #[test]
    fn unrecognized_nonzero_exit_is_system_error() {
        assert_eq!(
            classify_output("", "disk full", 1, Language::Python),
            ResponseCategory::SystemError
        );
    }

    #[test]
    fn classifies_runtime_error_timeout_and_success() {
        assert_eq!(
            classify_output("", "Traceback...", 1, Language::Python),
            ResponseCategory::RuntimeError
        );
        assert_eq!(
            classify_output("", "", 137, Language::Python),
            ResponseCategory::Timeout
        );
        assert_eq!(
            classify_output("", "", 0, Language::Python),
            ResponseCategory::Success
        );
    }
}
