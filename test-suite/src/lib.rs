//! Data-driven rubric and submission fixtures for autograder-core's
//! integration tests. Plain data only: parsing and grading happen on the
//! consumer side so this crate carries no dependency on autograder-core's
//! types.

/// A single-category criteria document: one `base` category with two
/// flat tests, no subjects, no bonus/penalty.
pub const MINIMAL_CRITERIA_TOML: &str = include_str!("../fixtures/minimal_criteria.toml");

/// A criteria document exercising every holder shape at once: a mixed
/// `base` category (subjects + flat tests under one `subjects_weight`
/// split), plus `bonus` and `penalty` categories.
pub const MIXED_SUBJECTS_CRITERIA_TOML: &str = include_str!("../fixtures/mixed_subjects_criteria.toml");

/// A minimal Python submission file, keyed by filename.
pub const SAMPLE_SUBMISSION_FILES: &[(&str, &str)] =
    &[("main.py", include_str!("../fixtures/sample_submission/main.py"))];
