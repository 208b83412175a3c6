//! # autograder-core
//!
//! A grading engine that takes a student code submission through a staged
//! pipeline: preflight checks, template loading, criteria-tree
//! construction, sandboxed test execution, weighted aggregation, feedback
//! rendering, and result export.
//!
//! ## Architecture
//!
//! The crate is organized around three tightly coupled subsystems:
//!
//! ### The grading pipeline ([`pipeline`])
//!
//! An ordered list of [`pipeline::Step`]s run against a shared
//! [`pipeline::PipelineContext`], each appending a
//! [`pipeline::StepResult`] to a [`pipeline::PipelineExecution`] log. The
//! first failure short-circuits the rest.
//!
//! - [`pipeline::steps::standard_steps`] - the standard BOOTSTRAP through
//!   EXPORT step order
//! - [`pipeline::run_pipeline`] - drives a list of steps to completion
//!
//! ### The rubric evaluation engine ([`criteria`], [`grader`], [`result`], [`focus`])
//!
//! - [`criteria::build_tree`] - normalizes instructor-authored config into
//!   a weighted [`criteria::CriteriaTree`]
//! - [`grader::Grader`] - walks a tree against a submission, producing a
//!   [`result::ResultTree`]
//! - [`focus::compute_focus`] - ranks individual tests by their impact on
//!   the final score
//!
//! ### The sandbox container pool ([`sandbox`])
//!
//! - [`sandbox::docker::DockerSandboxProvider`] - creates Docker-backed
//!   sandboxes
//! - [`sandbox::pool::LanguagePool`] - a bounded, pre-warmed pool for one
//!   language
//! - [`sandbox::manager::SandboxManager`] - owns every language's pool and
//!   the background TTL monitor
//!
//! ## External collaborators ([`external`])
//!
//! Narrow traits for persistence, feedback generation, and result export.
//! Production adapters live outside this crate; only in-memory fakes ship
//! here.
//!
//! ## Configuration
//!
//! Configured via TOML files. See [`config`] for schema details.

pub mod command_resolver;
pub mod config;
pub mod criteria;
pub mod external;
pub mod focus;
pub mod grader;
pub mod preflight;
pub mod pipeline;
pub mod result;
pub mod sandbox;
pub mod submission;
pub mod template;

pub use config::{Config, load_config};
pub use grader::Grader;
pub use pipeline::{PipelineContext, PipelineExecution, run_pipeline};
pub use result::ResultTree;
pub use sandbox::{Sandbox, SandboxProvider};
pub use submission::{Language, Submission};
pub use template::Template;
