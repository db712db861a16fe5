//! services/api/src/web/protocol.rs
//!
//! Defines the JSON messages exchanged with the browser front-end: the events it
//! posts and the session snapshot it renders.

use serde::{Deserialize, Serialize};
use tutor_core::domain::{
    LearningPath, Message, Module, QuizOutcome, SessionFeedback, UserProfile,
};
use tutor_core::machine::{Event, QuizRun, SessionState, View};
use utoipa::ToSchema;

//=========================================================================================
// Client -> Server Messages
//=========================================================================================

/// An action taken by the learner in the front-end.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Leave the welcome screen.
    Start,
    /// Submit the onboarding form.
    CompleteOnboarding {
        #[schema(value_type = Object)]
        profile: UserProfile,
    },
    /// Pick one of the suggested topics from the dashboard.
    SelectSuggestedTopic { title: String },
    /// Open a module of the current path for tutoring.
    SelectModule { module_id: String },
    /// Send a message to the tutor.
    SendMessage { text: String },
    EndSession,
    SubmitFeedback {
        #[schema(value_type = String, example = "medium")]
        rating: SessionFeedback,
    },
    StartQuiz,
    /// Answer the current question with the option at `option_index`.
    AnswerAndAdvance { option_index: usize },
    ExitQuiz,
    Logout,
}

impl From<ClientEvent> for Event {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::Start => Event::Start,
            ClientEvent::CompleteOnboarding { profile } => Event::CompleteOnboarding(profile),
            ClientEvent::SelectSuggestedTopic { title } => Event::SelectSuggestedTopic(title),
            ClientEvent::SelectModule { module_id } => Event::SelectModule(module_id),
            ClientEvent::SendMessage { text } => Event::SendMessage(text),
            ClientEvent::EndSession => Event::EndSession,
            ClientEvent::SubmitFeedback { rating } => Event::SubmitFeedback(rating),
            ClientEvent::StartQuiz => Event::StartQuiz,
            ClientEvent::AnswerAndAdvance { option_index } => {
                Event::AnswerAndAdvance(option_index)
            }
            ClientEvent::ExitQuiz => Event::ExitQuiz,
            ClientEvent::Logout => Event::Logout,
        }
    }
}

//=========================================================================================
// Server -> Client Messages
//=========================================================================================

/// Everything the front-end needs to render the current screen.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[schema(value_type = String, example = "dashboard")]
    pub view: View,
    /// True while the learner waits on a path, a tutor reply or a quiz.
    pub loading: bool,
    #[schema(value_type = Option<Object>)]
    pub profile: Option<UserProfile>,
    #[schema(value_type = Option<Object>)]
    pub learning_path: Option<LearningPath>,
    #[schema(value_type = Option<Object>)]
    pub current_module: Option<Module>,
    pub suggestions: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub transcript: Vec<Message>,
    pub quiz: Option<QuizProgress>,
}

/// The learner's view of a quiz run. Correct answers appear only once it is scored.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    pub title: String,
    pub module_id: String,
    pub question_index: usize,
    pub question_count: usize,
    pub current_question: Option<QuestionView>,
    #[schema(value_type = Option<Object>)]
    pub outcome: Option<QuizOutcome>,
    pub review: Vec<ReviewedQuestion>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct QuestionView {
    pub question: String,
    pub options: Vec<String>,
}

/// A question of a scored run, with the learner's answer next to the correct one.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub chosen_answer: Option<usize>,
    pub explanation: String,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            view: state.view(),
            loading: state.is_loading(),
            profile: state.profile().cloned(),
            learning_path: state.path().cloned(),
            current_module: state.current_module().cloned(),
            suggestions: state.suggestions().to_vec(),
            transcript: state.transcript().to_vec(),
            quiz: state.quiz().map(QuizProgress::from),
        }
    }
}

impl From<&QuizRun> for QuizProgress {
    fn from(run: &QuizRun) -> Self {
        let quiz = run.quiz();
        let outcome = run.outcome();
        let current_question = match outcome {
            Some(_) => None,
            None => quiz.questions().get(run.current_index()).map(|q| QuestionView {
                question: q.question.clone(),
                options: q.options.clone(),
            }),
        };
        let review = match outcome {
            Some(_) => quiz
                .questions()
                .iter()
                .enumerate()
                .map(|(i, q)| ReviewedQuestion {
                    question: q.question.clone(),
                    options: q.options.clone(),
                    correct_answer: q.correct_answer,
                    chosen_answer: run.answers().get(i).copied(),
                    explanation: q.explanation.clone(),
                })
                .collect(),
            None => Vec::new(),
        };

        Self {
            title: quiz.title().to_string(),
            module_id: run.module_id().to_string(),
            question_index: run.current_index(),
            question_count: quiz.len(),
            current_question,
            outcome,
            review,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"answer_and_advance","option_index":2}"#).unwrap();
        assert_eq!(Event::from(event), Event::AnswerAndAdvance(2));

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"submit_feedback","rating":"hard"}"#).unwrap();
        assert_eq!(Event::from(event), Event::SubmitFeedback(SessionFeedback::Hard));

        let event: ClientEvent = serde_json::from_str(r#"{"type":"logout"}"#).unwrap();
        assert_eq!(Event::from(event), Event::Logout);
    }

    #[test]
    fn unknown_event_types_are_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn welcome_snapshot_is_empty() {
        let snapshot = SessionSnapshot::from(&SessionState::default());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["view"], "welcome");
        assert_eq!(json["loading"], false);
        assert!(json["learningPath"].is_null());
        assert!(json["quiz"].is_null());
    }
}
