//! services/api/src/adapters/tutor_llm.rs
//!
//! This module contains the adapter for the tutoring LLM.
//! It implements the `TutorGateway` port from the `core` crate on top of any
//! OpenAI-compatible chat completion endpoint.

const CURRICULUM_INSTRUCTIONS: &str = r#"You are an expert curriculum designer.
Design a learning path that takes the learner from their current level to mastery of the topic.

Rules:
- Order the modules so each one builds on the previous one.
- Use between 3 and 6 modules.
- Write titles and descriptions in the learner's language.
- For each module, give a real, publicly reachable video URL (YouTube is fine) and, where you can, up to three reputable sources.
- Explain in one or two sentences why this path fits this learner.

Respond with JSON only, in exactly this shape:
{
  "modules": [
    {
      "id": "m1",
      "title": "...",
      "description": "...",
      "topics": ["...", "..."],
      "videoUrl": "https://...",
      "sources": [{"uri": "https://...", "title": "..."}]
    }
  ],
  "estimatedWeeks": 4,
  "personalizationReason": "..."
}"#;

const SUGGESTION_INSTRUCTIONS: &str = r#"You suggest what a learner could study next.
Suggest up to 5 short topic titles closely related to the learner's current topic and subject.
Write them in the learner's language.

Respond with JSON only: {"topics": ["...", "..."]}"#;

const QUIZ_INSTRUCTIONS: &str = r#"You write multiple-choice quizzes that check real understanding, not trivia.
Write exactly 5 questions about the module, each with 4 options and exactly one correct option.
"correctAnswer" is the zero-based index of the correct option.
Match the difficulty to the learner's level and write in the learner's language.

Respond with JSON only, in exactly this shape:
{
  "title": "...",
  "questions": [
    {"question": "...", "options": ["...", "...", "...", "..."], "correctAnswer": 0, "explanation": "..."}
  ]
}"#;

const TUTOR_INSTRUCTIONS: &str = r#"You are a Socratic tutor.

Your role:
- Never hand over the final answer. Guide the learner with one or two focused questions at a time.
- Build on what the learner has just said. If they are wrong, ask a question that exposes the gap.
- If they are stuck, give a small hint, then ask again.
- Keep every turn short: a few sentences at most.
- Stay on the current module; gently steer back if the learner drifts."#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info};
use tutor_core::{
    domain::{
        LearningPath, Message, Module, ModuleStatus, Quiz, QuizQuestion, Role, Source,
        UserProfile, QUESTIONS_PER_QUIZ,
    },
    fallback::{video_search_url, MAX_SUGGESTIONS},
    ports::{PortError, PortResult, TutorGateway},
};
use url::Url;

use crate::adapters::json_reply::parse_json_reply;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Model names for each kind of request.
#[derive(Clone, Debug)]
pub struct TutorModels {
    pub curriculum: String,
    pub tutor: String,
    pub quiz: String,
}

/// An adapter that implements `TutorGateway` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTutorAdapter {
    client: Client<OpenAIConfig>,
    models: TutorModels,
}

impl OpenAiTutorAdapter {
    /// Creates a new `OpenAiTutorAdapter`.
    pub fn new(client: Client<OpenAIConfig>, models: TutorModels) -> Self {
        Self { client, models }
    }

    /// Sends one chat request and returns the text of the first choice.
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatCompletionRequestMessage>,
        temperature: f32,
    ) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(temperature)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                PortError::InvalidResponse("LLM response contained no text content.".to_string())
            })
    }

    /// A system + user exchange for the JSON-producing requests.
    fn instructed(instructions: &str, user: String) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(instructions)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ])
    }
}

//=========================================================================================
// `TutorGateway` Trait Implementation
//=========================================================================================

#[async_trait]
impl TutorGateway for OpenAiTutorAdapter {
    /// Asks for a full curriculum and validates it into a `LearningPath`.
    async fn synthesize_path(&self, profile: &UserProfile) -> PortResult<LearningPath> {
        let messages = Self::instructed(CURRICULUM_INSTRUCTIONS, describe_learner(profile))?;
        let raw = self.complete(&self.models.curriculum, messages, 0.4).await?;
        let path = path_from_reply(parse_json_reply(&raw)?)?;
        info!(
            "Generated learning path for '{}' with {} modules",
            profile.topic,
            path.modules().len()
        );
        Ok(path)
    }

    async fn suggest_topics(&self, profile: &UserProfile) -> PortResult<Vec<String>> {
        let messages = Self::instructed(SUGGESTION_INSTRUCTIONS, describe_learner(profile))?;
        let raw = self.complete(&self.models.curriculum, messages, 0.8).await?;
        topics_from_reply(parse_json_reply(&raw)?)
    }

    /// Replays the transcript under the Socratic system prompt.
    async fn tutor_reply(
        &self,
        transcript: &[Message],
        profile: &UserProfile,
        module_title: &str,
    ) -> PortResult<String> {
        let system = format!(
            "{}\n\nLearner: {} ({}, {} level) studying {}.\nGoal: {}. Preferred style: {}.\n\
             Current module: \"{}\" in the topic \"{}\".\nAlways reply in {}.",
            TUTOR_INSTRUCTIONS,
            profile.name,
            profile.class_name,
            profile.level,
            profile.subject,
            profile.goal,
            profile.learning_style,
            module_title,
            profile.topic,
            profile.language,
        );

        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        )];
        for message in transcript {
            messages.push(chat_message(message)?);
        }
        debug!("Sending {} transcript messages to the tutor model", transcript.len());

        let reply = self.complete(&self.models.tutor, messages, 0.7).await?;
        Ok(reply.trim().to_string())
    }

    async fn generate_quiz(&self, profile: &UserProfile, module_title: &str) -> PortResult<Quiz> {
        let user = format!(
            "{}\n\nModule to quiz: \"{}\"",
            describe_learner(profile),
            module_title
        );
        let messages = Self::instructed(QUIZ_INSTRUCTIONS, user)?;
        let raw = self.complete(&self.models.quiz, messages, 0.5).await?;
        quiz_from_reply(parse_json_reply(&raw)?, module_title)
    }
}

//=========================================================================================
// Request Helpers
//=========================================================================================

fn describe_learner(profile: &UserProfile) -> String {
    format!(
        "LEARNER PROFILE:\n\
         - Name: {}\n\
         - Class: {}\n\
         - Subject: {}\n\
         - Topic: {}\n\
         - Level: {}\n\
         - Goal: {}\n\
         - Learning style: {}\n\
         - Time available per day: {} minutes\n\
         - Language: {}\n\
         - Topics already completed: {}",
        profile.name,
        profile.class_name,
        profile.subject,
        profile.topic,
        profile.level,
        profile.goal,
        profile.learning_style,
        profile.time_per_day,
        profile.language,
        if profile.performance.completed_topics().is_empty() {
            "none".to_string()
        } else {
            profile.performance.completed_topics().join(", ")
        },
    )
}

fn chat_message(message: &Message) -> PortResult<ChatCompletionRequestMessage> {
    let content = message.content.clone();
    let built = match message.role {
        Role::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
        Role::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
        Role::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?,
        ),
    };
    Ok(built)
}

//=========================================================================================
// "Impure" Reply Structs
//=========================================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathReply {
    modules: Vec<ModuleReply>,
    #[serde(default)]
    estimated_weeks: Option<u32>,
    #[serde(default)]
    personalization_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleReply {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default, alias = "video")]
    video_url: Option<String>,
    #[serde(default)]
    sources: Vec<SourceReply>,
}

#[derive(Debug, Deserialize)]
struct SourceReply {
    #[serde(alias = "url")]
    uri: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicsReply {
    Wrapped { topics: Vec<String> },
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizReply {
    #[serde(default)]
    title: Option<String>,
    questions: Vec<QuestionReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionReply {
    question: String,
    options: Vec<String>,
    correct_answer: usize,
    #[serde(default)]
    explanation: String,
}

//=========================================================================================
// Reply Conversion
//=========================================================================================

fn path_from_reply(reply: PathReply) -> PortResult<LearningPath> {
    let modules: Vec<ModuleReply> = reply
        .modules
        .into_iter()
        .filter(|m| !m.title.trim().is_empty())
        .collect();

    // Provider ids are kept only when every module has one and none repeat.
    let mut seen = HashSet::new();
    let ids_usable = modules.iter().all(|m| {
        m.id
            .as_deref()
            .map(str::trim)
            .is_some_and(|id| !id.is_empty() && seen.insert(id.to_string()))
    });

    let modules = modules
        .into_iter()
        .enumerate()
        .map(|(index, m)| {
            let id = match (&m.id, ids_usable) {
                (Some(id), true) => id.trim().to_string(),
                _ => format!("m{}", index + 1),
            };
            let title = m.title.trim().to_string();
            Module {
                id,
                video_url: usable_video_url(m.video_url.as_deref(), &title),
                sources: m
                    .sources
                    .into_iter()
                    .filter(|s| is_web_url(&s.uri))
                    .map(|s| Source {
                        title: if s.title.trim().is_empty() {
                            s.uri.clone()
                        } else {
                            s.title
                        },
                        uri: s.uri,
                    })
                    .collect(),
                description: m.description,
                status: ModuleStatus::Current,
                topics: m.topics,
                title,
            }
        })
        .collect();

    let reason = reply
        .personalization_reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Ordered from fundamentals to mastery.".to_string());
    LearningPath::new(modules, reply.estimated_weeks.unwrap_or(1).max(1), reason)
        .map_err(|e| PortError::InvalidResponse(e.to_string()))
}

fn topics_from_reply(reply: TopicsReply) -> PortResult<Vec<String>> {
    let topics = match reply {
        TopicsReply::Wrapped { topics } | TopicsReply::List(topics) => topics,
    };
    Ok(topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect())
}

fn quiz_from_reply(reply: QuizReply, module_title: &str) -> PortResult<Quiz> {
    if reply.questions.len() != QUESTIONS_PER_QUIZ as usize {
        return Err(PortError::InvalidResponse(format!(
            "expected {} quiz questions, got {}",
            QUESTIONS_PER_QUIZ,
            reply.questions.len()
        )));
    }
    let questions = reply
        .questions
        .into_iter()
        .map(|q| QuizQuestion {
            question: q.question,
            options: q.options,
            correct_answer: q.correct_answer,
            explanation: q.explanation,
        })
        .collect();
    let title = reply
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("{} quiz", module_title));
    Quiz::new(title, questions).map_err(|e| PortError::InvalidResponse(e.to_string()))
}

fn is_web_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Keeps an absolute http(s) link, otherwise falls back to a search for the module title.
fn usable_video_url(raw: Option<&str>, title: &str) -> Option<String> {
    match raw {
        Some(raw) if is_web_url(raw) => Some(raw.trim().to_string()),
        _ => video_search_url(title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct_answer: usize) -> QuestionReply {
        QuestionReply {
            question: "Which force?".to_string(),
            options: vec!["gravity".into(), "friction".into(), "tension".into(), "lift".into()],
            correct_answer,
            explanation: String::new(),
        }
    }

    #[test]
    fn path_reply_becomes_current_modules_with_links() {
        let reply: PathReply = parse_json_reply(
            r#"```json
            {
              "modules": [
                {"id": "a", "title": "Vectors", "description": "Arrows", "topics": ["magnitude"],
                 "videoUrl": "https://www.youtube.com/watch?v=abc",
                 "sources": [{"uri": "https://openstax.org/physics", "title": "OpenStax"},
                             {"uri": "not a url", "title": "Broken"}]},
                {"id": "b", "title": "Kinematics", "videoUrl": "youtube: kinematics intro"}
              ],
              "estimatedWeeks": 3,
              "personalizationReason": "Starts with the maths you need."
            }
            ```"#,
        )
        .unwrap();
        let path = path_from_reply(reply).unwrap();

        assert_eq!(path.estimated_weeks(), 3);
        assert!(path.modules().iter().all(|m| m.status == ModuleStatus::Current));
        assert_eq!(path.modules()[0].id, "a");
        assert_eq!(path.modules()[0].sources.len(), 1);
        assert_eq!(
            path.modules()[0].video_url.as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
        assert!(path.modules()[1]
            .video_url
            .as_deref()
            .unwrap()
            .contains("search_query=Kinematics"));
    }

    #[test]
    fn duplicate_or_missing_ids_are_renumbered() {
        let reply: PathReply = parse_json_reply(
            r#"{"modules": [{"id": "x", "title": "One"}, {"id": "x", "title": "Two"}, {"title": "Three"}]}"#,
        )
        .unwrap();
        let path = path_from_reply(reply).unwrap();

        let ids: Vec<_> = path.modules().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(path.estimated_weeks(), 1);
    }

    #[test]
    fn empty_path_is_an_invalid_response() {
        let reply: PathReply = parse_json_reply(r#"{"modules": []}"#).unwrap();
        assert!(matches!(
            path_from_reply(reply),
            Err(PortError::InvalidResponse(_))
        ));
    }

    #[test]
    fn topics_accept_both_shapes() {
        let wrapped: TopicsReply = parse_json_reply(r#"{"topics": ["A", " ", "B"]}"#).unwrap();
        assert_eq!(topics_from_reply(wrapped).unwrap(), vec!["A", "B"]);

        let list: TopicsReply = parse_json_reply(r#"["1","2","3","4","5","6"]"#).unwrap();
        assert_eq!(topics_from_reply(list).unwrap().len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn quiz_needs_exactly_five_valid_questions() {
        let four = QuizReply {
            title: None,
            questions: (0..4).map(|_| question(0)).collect(),
        };
        assert!(quiz_from_reply(four, "Forces").is_err());

        let out_of_range = QuizReply {
            title: None,
            questions: vec![question(0), question(1), question(2), question(3), question(7)],
        };
        assert!(quiz_from_reply(out_of_range, "Forces").is_err());

        let good = QuizReply {
            title: None,
            questions: (0..5).map(question).map(|mut q| {
                q.correct_answer %= 4;
                q
            }).collect(),
        };
        let quiz = quiz_from_reply(good, "Forces").unwrap();
        assert_eq!(quiz.len(), 5);
        assert_eq!(quiz.title(), "Forces quiz");
    }
}
