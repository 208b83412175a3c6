//! Narrow external-collaborator traits: persistence, feedback generation,
//! and result export. Each is an interface only — the crate
//! ships in-memory fakes for its own tests, and production adapters (an
//! HTTP client, a database, an AI client) are supplied by whatever binary
//! links this crate.

use async_trait::async_trait;

use crate::result::ResultTree;
use crate::submission::Submission;

/// A submission's lifecycle status as tracked by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Stores grading config, submission, and result records.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn create(&self, submission: &Submission) -> anyhow::Result<u64>;
    async fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Submission>>;
    async fn update_status(&self, id: u64, status: SubmissionStatus) -> anyhow::Result<()>;
    async fn list_for_user(&self, user_id: u64) -> anyhow::Result<Vec<Submission>>;
}

/// Preferences passed alongside a result tree to the feedback generator
/// (e.g. tone, verbosity); opaque beyond being serializable.
pub type FeedbackPreferences = serde_json::Value;

/// Renders human-readable feedback text from a result tree. Treated as
/// opaque — the core never inspects the generated text.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, result_tree: &ResultTree, preferences: &FeedbackPreferences) -> anyhow::Result<String>;
}

/// The final, synthesized output of a pipeline run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GradingResult {
    pub result_tree: ResultTree,
    pub feedback: Option<String>,
}

/// Persists or ships a finished grading result onward (e.g. to the HTTP
/// layer or a file).
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, result: &GradingResult) -> anyhow::Result<()>;
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemorySubmissionRepository {
        submissions: Mutex<Vec<(u64, Submission, SubmissionStatus)>>,
        next_id: Mutex<u64>,
    }

    #[async_trait]
    impl SubmissionRepository for InMemorySubmissionRepository {
        async fn create(&self, submission: &Submission) -> anyhow::Result<u64> {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            self.submissions.lock().unwrap().push((id, submission.clone(), SubmissionStatus::Pending));
            Ok(id)
        }

        async fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Submission>> {
            Ok(self.submissions.lock().unwrap().iter().find(|(i, _, _)| *i == id).map(|(_, s, _)| s.clone()))
        }

        async fn update_status(&self, id: u64, status: SubmissionStatus) -> anyhow::Result<()> {
            if let Some(entry) = self.submissions.lock().unwrap().iter_mut().find(|(i, _, _)| *i == id) {
                entry.2 = status;
            }
            Ok(())
        }

        async fn list_for_user(&self, user_id: u64) -> anyhow::Result<Vec<Submission>> {
            Ok(self
                .submissions
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, s, _)| s.user_id == user_id)
                .map(|(_, s, _)| s.clone())
                .collect())
        }
    }

    pub struct StaticFeedbackGenerator(pub String);

    #[async_trait]
    impl FeedbackGenerator for StaticFeedbackGenerator {
        async fn generate(&self, _result_tree: &ResultTree, _preferences: &FeedbackPreferences) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    pub struct InMemoryExporter {
        pub exported: Mutex<Vec<GradingResult>>,
    }

    #[async_trait]
    impl Exporter for InMemoryExporter {
        async fn export(&self, result: &GradingResult) -> anyhow::Result<()> {
            self.exported.lock().unwrap().push(result.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::submission::Language;

    #[tokio::test]
    async fn in_memory_repository_round_trips() {
        let repo = InMemorySubmissionRepository::default();
        let submission = Submission::new("ada", 1, 42, Language::Python);
        let id = repo.create(&submission).await.unwrap();
        repo.update_status(id, SubmissionStatus::Running).await.unwrap();
        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "ada");
        assert_eq!(repo.list_for_user(1).await.unwrap().len(), 1);
    }
}
