//! crates/tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) the tutor core depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the session
//! logic independent of the AI provider and of the storage backend.

use async_trait::async_trait;
use crate::domain::{LearningPath, Message, Quiz, UserProfile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("The service returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The generative-AI capability that supplies curricula, suggestions, replies and quizzes.
#[async_trait]
pub trait TutorGateway: Send + Sync {
    /// Builds a personalized learning path for the profile's current topic.
    async fn synthesize_path(&self, profile: &UserProfile) -> PortResult<LearningPath>;

    /// Suggests up to five related topics to study next.
    async fn suggest_topics(&self, profile: &UserProfile) -> PortResult<Vec<String>>;

    /// Produces the tutor's next turn for a Socratic dialogue.
    async fn tutor_reply(
        &self,
        transcript: &[Message],
        profile: &UserProfile,
        module_title: &str,
    ) -> PortResult<String>;

    /// Generates a five-question multiple-choice quiz for a module.
    async fn generate_quiz(&self, profile: &UserProfile, module_title: &str) -> PortResult<Quiz>;
}

/// A string-keyed store of string values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    /// Writes every entry, or none of them.
    async fn put_all(&self, entries: &[(&str, String)]) -> PortResult<()>;

    /// Removes every listed key. Missing keys are not an error.
    async fn delete_all(&self, keys: &[&str]) -> PortResult<()>;
}
