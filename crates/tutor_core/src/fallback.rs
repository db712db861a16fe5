//! crates/tutor_core/src/fallback.rs
//!
//! A `TutorGateway` decorator that turns provider failures into usable content.
//!
//! Path, suggestion and reply failures are replaced with fixed fallbacks so the
//! session always has a next state. Quiz failures are passed through unchanged.

use async_trait::async_trait;
use tracing::warn;
use url::Url;

use crate::domain::{LearningPath, Message, Module, ModuleStatus, Quiz, UserProfile};
use crate::ports::{PortResult, TutorGateway};

/// Maximum number of topic suggestions shown on the dashboard.
pub const MAX_SUGGESTIONS: usize = 5;

pub const FALLBACK_MODULE_ID: &str = "fallback-1";

const SOCRATIC_NUDGE: &str = "That's an interesting line of thought. What do you already know \
about this, and how could you check whether your idea holds up?";

/// Wraps a gateway and applies the fallback policy to its failures.
#[derive(Clone)]
pub struct FallbackGateway<G> {
    inner: G,
}

impl<G: TutorGateway> FallbackGateway<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<G: TutorGateway> TutorGateway for FallbackGateway<G> {
    async fn synthesize_path(&self, profile: &UserProfile) -> PortResult<LearningPath> {
        match self.inner.synthesize_path(profile).await {
            Ok(path) => Ok(path),
            Err(e) => {
                warn!("Path generation failed, using fallback path: {}", e);
                Ok(fallback_path(profile))
            }
        }
    }

    async fn suggest_topics(&self, profile: &UserProfile) -> PortResult<Vec<String>> {
        match self.inner.suggest_topics(profile).await {
            Ok(mut topics) => {
                topics.truncate(MAX_SUGGESTIONS);
                Ok(topics)
            }
            Err(e) => {
                warn!("Topic suggestions failed, using templated titles: {}", e);
                Ok(fallback_topics(&profile.topic))
            }
        }
    }

    async fn tutor_reply(
        &self,
        transcript: &[Message],
        profile: &UserProfile,
        module_title: &str,
    ) -> PortResult<String> {
        match self.inner.tutor_reply(transcript, profile, module_title).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("Tutor reply failed, sending generic nudge: {}", e);
                Ok(SOCRATIC_NUDGE.to_string())
            }
        }
    }

    async fn generate_quiz(&self, profile: &UserProfile, module_title: &str) -> PortResult<Quiz> {
        self.inner.generate_quiz(profile, module_title).await
    }
}

/// A deterministic single-module path for the profile's topic.
pub fn fallback_path(profile: &UserProfile) -> LearningPath {
    let topic = profile.topic.trim();
    let module = Module {
        id: FALLBACK_MODULE_ID.to_string(),
        title: format!("Introduction to {}", topic),
        description: format!(
            "Core ideas and vocabulary of {} in {}, to get you started.",
            topic, profile.subject
        ),
        status: ModuleStatus::Current,
        topics: vec![topic.to_string()],
        video_url: video_search_url(topic),
        sources: Vec::new(),
    };
    LearningPath::single(
        module,
        format!(
            "Fallback path: a personalized curriculum could not be generated, so this \
             starter module covers the basics of {}.",
            topic
        ),
    )
}

/// Five templated follow-up titles derived from the topic.
pub fn fallback_topics(topic: &str) -> Vec<String> {
    let topic = topic.trim();
    vec![
        format!("Advanced {}", topic),
        format!("{} in Practice", topic),
        format!("History of {}", topic),
        format!("Common Mistakes in {}", topic),
        format!("Applications of {}", topic),
    ]
}

/// A YouTube search link for the query, used when no concrete video is known.
pub fn video_search_url(query: &str) -> Option<String> {
    Url::parse_with_params(
        "https://www.youtube.com/results",
        &[("search_query", query.trim())],
    )
    .map(|url| url.to_string())
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KnowledgeLevel, LearningGoal, LearningStyle, PerformanceData};
    use crate::ports::PortError;

    /// Fails every call, or returns a fixed suggestion list when one is set.
    struct FlakyGateway {
        topics: Option<Vec<String>>,
    }

    #[async_trait]
    impl TutorGateway for FlakyGateway {
        async fn synthesize_path(&self, _profile: &UserProfile) -> PortResult<LearningPath> {
            Err(PortError::Unexpected("provider down".to_string()))
        }

        async fn suggest_topics(&self, _profile: &UserProfile) -> PortResult<Vec<String>> {
            self.topics
                .clone()
                .ok_or_else(|| PortError::InvalidResponse("not json".to_string()))
        }

        async fn tutor_reply(
            &self,
            _transcript: &[Message],
            _profile: &UserProfile,
            _module_title: &str,
        ) -> PortResult<String> {
            Err(PortError::Unexpected("timeout".to_string()))
        }

        async fn generate_quiz(&self, _profile: &UserProfile, _module_title: &str) -> PortResult<Quiz> {
            Err(PortError::InvalidResponse("four questions".to_string()))
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            name: "Ada".to_string(),
            class_name: "Grade 10".to_string(),
            subject: "Chemistry".to_string(),
            level: KnowledgeLevel::Intermediate,
            goal: LearningGoal::ConceptUnderstanding,
            learning_style: LearningStyle::Video,
            time_per_day: 20,
            topic: "Chemical bonding".to_string(),
            language: "English".to_string(),
            performance: PerformanceData::default(),
        }
    }

    #[tokio::test]
    async fn failed_path_becomes_single_fallback_module() {
        let gateway = FallbackGateway::new(FlakyGateway { topics: None });
        let path = gateway.synthesize_path(&profile()).await.unwrap();

        assert_eq!(path.modules().len(), 1);
        assert_eq!(path.first_module().id, FALLBACK_MODULE_ID);
        assert_eq!(path.first_module().status, ModuleStatus::Current);
        assert!(path.personalization_reason().starts_with("Fallback"));
        assert!(path
            .first_module()
            .video_url
            .as_deref()
            .unwrap()
            .starts_with("https://www.youtube.com/results?search_query=Chemical+bonding"));
    }

    #[tokio::test]
    async fn failed_suggestions_are_templated_from_topic() {
        let gateway = FallbackGateway::new(FlakyGateway { topics: None });
        let topics = gateway.suggest_topics(&profile()).await.unwrap();

        assert_eq!(topics.len(), MAX_SUGGESTIONS);
        assert!(topics.iter().all(|t| t.contains("Chemical bonding")));
    }

    #[tokio::test]
    async fn long_suggestion_lists_are_cut_to_five() {
        let many = (1..=8).map(|i| format!("Topic {i}")).collect();
        let gateway = FallbackGateway::new(FlakyGateway { topics: Some(many) });
        let topics = gateway.suggest_topics(&profile()).await.unwrap();

        assert_eq!(topics, vec!["Topic 1", "Topic 2", "Topic 3", "Topic 4", "Topic 5"]);
    }

    #[tokio::test]
    async fn failed_reply_becomes_a_nudge_but_quiz_failure_propagates() {
        let gateway = FallbackGateway::new(FlakyGateway { topics: None });

        let reply = gateway.tutor_reply(&[], &profile(), "Ionic bonds").await.unwrap();
        assert_eq!(reply, SOCRATIC_NUDGE);

        let quiz = gateway.generate_quiz(&profile(), "Ionic bonds").await;
        assert!(matches!(quiz, Err(PortError::InvalidResponse(_))));
    }
}
