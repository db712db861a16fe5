//! crates/tutor_core/src/machine.rs
//!
//! The session state machine that sequences the tutor's screens.
//!
//! `step` is a pure function from `(state, event, now)` to a new state plus a list of
//! effects. It never talks to the gateway or the store itself: a driver executes the
//! effects and feeds gateway results back in as completion events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    LearningPath, Message, Module, PerformanceData, Quiz, QuizOutcome, Role, SessionFeedback,
    UserProfile,
};
use crate::fallback::MAX_SUGGESTIONS;
use crate::ports::PortResult;

//=========================================================================================
// State
//=========================================================================================

/// The screen currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Welcome,
    Onboarding,
    Dashboard,
    Tutoring,
    Quiz,
    Feedback,
}

/// Why a learning path is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathPurpose {
    Onboarding,
    TopicChange,
}

/// A gateway call the user has to wait for. Suggestions never block and are not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCall {
    Path(PathPurpose),
    TutorReply,
    Quiz,
}

/// Identifies one gateway request. A completion applies only while its id is awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    call: PendingCall,
    request: RequestId,
}

impl Pending {
    fn issue(call: PendingCall) -> Self {
        Self {
            call,
            request: RequestId::fresh(),
        }
    }
}

/// One attempt at a quiz: the answers given so far and, once finished, the grade.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizRun {
    quiz: Quiz,
    module_id: String,
    answers: Vec<usize>,
    outcome: Option<QuizOutcome>,
}

impl QuizRun {
    fn new(quiz: Quiz, module_id: String) -> Self {
        Self {
            quiz,
            module_id,
            answers: Vec::new(),
            outcome: None,
        }
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn answers(&self) -> &[usize] {
        &self.answers
    }

    /// Index of the question awaiting an answer. Equals the quiz length once finished.
    pub fn current_index(&self) -> usize {
        self.answers.len()
    }

    pub fn outcome(&self) -> Option<QuizOutcome> {
        self.outcome
    }
}

/// Everything the tutor holds in memory for one browser session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    view: View,
    profile: Option<UserProfile>,
    path: Option<LearningPath>,
    current_module_id: Option<String>,
    suggestions: Vec<String>,
    transcript: Vec<Message>,
    session_started_at: Option<DateTime<Utc>>,
    quiz: Option<QuizRun>,
    pending: Option<Pending>,
    suggestions_request: Option<RequestId>,
}

impl SessionState {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn path(&self) -> Option<&LearningPath> {
        self.path.as_ref()
    }

    /// The selected module, looked up in the current path so its status is always fresh.
    pub fn current_module(&self) -> Option<&Module> {
        let id = self.current_module_id.as_deref()?;
        self.path.as_ref()?.module(id)
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.session_started_at
    }

    pub fn quiz(&self) -> Option<&QuizRun> {
        self.quiz.as_ref()
    }

    pub fn pending(&self) -> Option<PendingCall> {
        self.pending.map(|p| p.call)
    }

    /// The blocking request whose completion is awaited.
    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending.map(|p| p.request)
    }

    /// The suggestion request whose result is awaited, if any.
    pub fn suggestions_request(&self) -> Option<RequestId> {
        self.suggestions_request
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    fn awaits(&self, call: PendingCall, request: RequestId) -> bool {
        self.pending == Some(Pending { call, request })
    }
}

//=========================================================================================
// Events and Effects
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    CompleteOnboarding(UserProfile),
    SelectSuggestedTopic(String),
    SelectModule(String),
    SendMessage(String),
    EndSession,
    SubmitFeedback(SessionFeedback),
    StartQuiz,
    AnswerAndAdvance(usize),
    ExitQuiz,
    Logout,

    // --- Gateway completions ---
    PathSynthesized {
        request: RequestId,
        purpose: PathPurpose,
        profile: UserProfile,
        result: PortResult<LearningPath>,
    },
    TopicsSuggested {
        request: RequestId,
        result: PortResult<Vec<String>>,
    },
    TutorReplied {
        request: RequestId,
        result: PortResult<String>,
    },
    QuizGenerated {
        request: RequestId,
        result: PortResult<Quiz>,
    },
}

impl Event {
    /// Completions come from the driver; everything else is a user action.
    pub fn is_user_action(&self) -> bool {
        !matches!(
            self,
            Event::PathSynthesized { .. }
                | Event::TopicsSuggested { .. }
                | Event::TutorReplied { .. }
                | Event::QuizGenerated { .. }
        )
    }
}

/// Work the driver performs on behalf of a transition.
///
/// Gateway requests carry the `RequestId` their completion event must echo back.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SynthesizePath {
        request: RequestId,
        purpose: PathPurpose,
        profile: UserProfile,
    },
    SuggestTopics {
        request: RequestId,
        profile: UserProfile,
    },
    TutorReply {
        request: RequestId,
        transcript: Vec<Message>,
        profile: UserProfile,
        module_title: String,
    },
    GenerateQuiz {
        request: RequestId,
        profile: UserProfile,
        module_title: String,
    },
    Persist {
        profile: UserProfile,
        path: LearningPath,
    },
    ClearPersistence,
}

impl Effect {
    /// Writes to the saved session, as opposed to gateway calls.
    pub fn is_storage(&self) -> bool {
        matches!(self, Effect::Persist { .. } | Effect::ClearPersistence)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: SessionState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    fn with(state: SessionState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }
}

//=========================================================================================
// Transition Functions
//=========================================================================================

/// The initial state: Welcome, or Dashboard when a saved profile and path were restored.
pub fn boot(saved: Option<(UserProfile, LearningPath)>) -> Transition {
    let Some((profile, path)) = saved else {
        return Transition::stay(SessionState::default());
    };

    info!("Restored saved session for {}", profile.name);
    let request = RequestId::fresh();
    let state = SessionState {
        view: View::Dashboard,
        current_module_id: Some(path.first_module().id.clone()),
        profile: Some(profile.clone()),
        path: Some(path),
        suggestions_request: Some(request),
        ..SessionState::default()
    };
    Transition::with(state, vec![Effect::SuggestTopics { request, profile }])
}

/// Applies one event. Invalid or out-of-place events leave the state unchanged.
pub fn step(state: SessionState, event: Event, now: DateTime<Utc>) -> Transition {
    if let Some(pending) = state.pending {
        if event.is_user_action() && !matches!(event, Event::Logout) {
            debug!("Ignoring {:?} while waiting on {:?}", event, pending.call);
            return Transition::stay(state);
        }
    }

    match event {
        Event::Start => start(state),
        Event::CompleteOnboarding(draft) => complete_onboarding(state, draft),
        Event::SelectSuggestedTopic(title) => select_suggested_topic(state, &title),
        Event::SelectModule(module_id) => select_module(state, &module_id, now),
        Event::SendMessage(text) => send_message(state, &text, now),
        Event::EndSession => end_session(state, now),
        Event::SubmitFeedback(rating) => submit_feedback(state, rating),
        Event::StartQuiz => start_quiz(state),
        Event::AnswerAndAdvance(option) => answer_and_advance(state, option),
        Event::ExitQuiz => exit_quiz(state),
        Event::Logout => logout(),
        Event::PathSynthesized {
            request,
            purpose,
            profile,
            result,
        } => path_synthesized(state, request, purpose, profile, result),
        Event::TopicsSuggested { request, result } => topics_suggested(state, request, result),
        Event::TutorReplied { request, result } => tutor_replied(state, request, result, now),
        Event::QuizGenerated { request, result } => quiz_generated(state, request, result),
    }
}

fn start(state: SessionState) -> Transition {
    if state.view != View::Welcome {
        return Transition::stay(state);
    }
    Transition::stay(SessionState {
        view: View::Onboarding,
        ..state
    })
}

fn complete_onboarding(state: SessionState, draft: UserProfile) -> Transition {
    if state.view != View::Onboarding {
        return Transition::stay(state);
    }
    if let Err(e) = draft.validate_draft() {
        debug!("Rejected onboarding draft: {}", e);
        return Transition::stay(state);
    }

    // A new learner starts with no history, whatever the draft carried.
    let profile = draft.with_performance(PerformanceData::default());
    let purpose = PathPurpose::Onboarding;
    let pending = Pending::issue(PendingCall::Path(purpose));
    Transition::with(
        SessionState {
            pending: Some(pending),
            ..state
        },
        vec![Effect::SynthesizePath {
            request: pending.request,
            purpose,
            profile,
        }],
    )
}

fn select_suggested_topic(state: SessionState, title: &str) -> Transition {
    let title = title.trim();
    if state.view != View::Dashboard || title.is_empty() {
        return Transition::stay(state);
    }
    let Some(profile) = state.profile.as_ref() else {
        return Transition::stay(state);
    };

    let purpose = PathPurpose::TopicChange;
    let profile = profile.with_topic(title);
    let pending = Pending::issue(PendingCall::Path(purpose));
    Transition::with(
        SessionState {
            pending: Some(pending),
            ..state
        },
        vec![Effect::SynthesizePath {
            request: pending.request,
            purpose,
            profile,
        }],
    )
}

fn path_synthesized(
    state: SessionState,
    request: RequestId,
    purpose: PathPurpose,
    profile: UserProfile,
    result: PortResult<LearningPath>,
) -> Transition {
    if !state.awaits(PendingCall::Path(purpose), request) {
        debug!("Dropping stale learning path result for {:?}", purpose);
        return Transition::stay(state);
    }
    let state = SessionState {
        pending: None,
        ..state
    };

    let path = match result {
        Ok(path) => path,
        Err(e) => {
            error!("Learning path generation failed ({:?}): {}", purpose, e);
            return Transition::stay(state);
        }
    };

    info!(
        "Learning path ready for '{}' with {} modules",
        profile.topic,
        path.modules().len()
    );
    // A new path replaces the old one entirely; nothing is merged.
    let suggestions_request = RequestId::fresh();
    let next = SessionState {
        view: View::Dashboard,
        current_module_id: Some(path.first_module().id.clone()),
        profile: Some(profile.clone()),
        path: Some(path.clone()),
        suggestions: Vec::new(),
        suggestions_request: Some(suggestions_request),
        ..state
    };
    Transition::with(
        next,
        vec![
            Effect::Persist {
                profile: profile.clone(),
                path,
            },
            Effect::SuggestTopics {
                request: suggestions_request,
                profile,
            },
        ],
    )
}

fn topics_suggested(
    state: SessionState,
    request: RequestId,
    result: PortResult<Vec<String>>,
) -> Transition {
    if state.suggestions_request != Some(request) {
        debug!("Dropping stale topic suggestions");
        return Transition::stay(state);
    }
    let state = SessionState {
        suggestions_request: None,
        ..state
    };
    match result {
        Ok(mut suggestions) => {
            suggestions.truncate(MAX_SUGGESTIONS);
            Transition::stay(SessionState {
                suggestions,
                ..state
            })
        }
        Err(e) => {
            warn!("Topic suggestions unavailable: {}", e);
            Transition::stay(state)
        }
    }
}

fn select_module(state: SessionState, module_id: &str, now: DateTime<Utc>) -> Transition {
    if state.view != View::Dashboard {
        return Transition::stay(state);
    }
    let belongs = state
        .path
        .as_ref()
        .is_some_and(|path| path.module(module_id).is_some());
    if !belongs {
        debug!("Module {} is not part of the current path", module_id);
        return Transition::stay(state);
    }

    Transition::stay(SessionState {
        view: View::Tutoring,
        current_module_id: Some(module_id.to_string()),
        session_started_at: Some(now),
        transcript: Vec::new(),
        ..state
    })
}

fn send_message(state: SessionState, text: &str, now: DateTime<Utc>) -> Transition {
    let text = text.trim();
    if state.view != View::Tutoring || text.is_empty() {
        return Transition::stay(state);
    }
    let module_title = state.current_module().map(|m| m.title.clone());
    let (Some(profile), Some(module_title)) = (state.profile.clone(), module_title) else {
        return Transition::stay(state);
    };

    let transcript = appended(&state.transcript, Role::User, text, now);
    let pending = Pending::issue(PendingCall::TutorReply);
    Transition::with(
        SessionState {
            transcript: transcript.clone(),
            pending: Some(pending),
            ..state
        },
        vec![Effect::TutorReply {
            request: pending.request,
            transcript,
            profile,
            module_title,
        }],
    )
}

fn tutor_replied(
    state: SessionState,
    request: RequestId,
    result: PortResult<String>,
    now: DateTime<Utc>,
) -> Transition {
    if !state.awaits(PendingCall::TutorReply, request) {
        debug!("Dropping stale tutor reply");
        return Transition::stay(state);
    }
    let state = SessionState {
        pending: None,
        ..state
    };

    match result {
        Ok(reply) => {
            let transcript = appended(&state.transcript, Role::Assistant, &reply, now);
            Transition::stay(SessionState {
                transcript,
                ..state
            })
        }
        Err(e) => {
            error!("Tutor reply failed: {}", e);
            Transition::stay(state)
        }
    }
}

fn end_session(state: SessionState, now: DateTime<Utc>) -> Transition {
    if state.view != View::Tutoring {
        return Transition::stay(state);
    }
    let minutes = state
        .session_started_at
        .map(|started| elapsed_minutes(started, now))
        .unwrap_or(0);
    let profile = state
        .profile
        .as_ref()
        .map(|p| p.with_performance(p.performance.with_time_spent(minutes)));

    info!("Tutoring session ended after {} minutes", minutes);
    Transition::stay(SessionState {
        view: View::Feedback,
        profile,
        transcript: Vec::new(),
        session_started_at: None,
        ..state
    })
}

fn submit_feedback(state: SessionState, rating: SessionFeedback) -> Transition {
    if state.view != View::Feedback {
        return Transition::stay(state);
    }
    let Some(profile) = state.profile.as_ref() else {
        return Transition::stay(state);
    };

    let profile = profile.with_performance(profile.performance.with_feedback(rating));
    let effects = match state.path.clone() {
        Some(path) => vec![Effect::Persist {
            profile: profile.clone(),
            path,
        }],
        None => Vec::new(),
    };
    Transition::with(
        SessionState {
            view: View::Dashboard,
            profile: Some(profile),
            ..state
        },
        effects,
    )
}

fn start_quiz(state: SessionState) -> Transition {
    if state.view != View::Dashboard {
        return Transition::stay(state);
    }
    let module_title = state.current_module().map(|m| m.title.clone());
    let (Some(profile), Some(module_title)) = (state.profile.clone(), module_title) else {
        return Transition::stay(state);
    };

    let pending = Pending::issue(PendingCall::Quiz);
    Transition::with(
        SessionState {
            pending: Some(pending),
            ..state
        },
        vec![Effect::GenerateQuiz {
            request: pending.request,
            profile,
            module_title,
        }],
    )
}

fn quiz_generated(state: SessionState, request: RequestId, result: PortResult<Quiz>) -> Transition {
    if !state.awaits(PendingCall::Quiz, request) {
        debug!("Dropping stale quiz");
        return Transition::stay(state);
    }
    let state = SessionState {
        pending: None,
        ..state
    };

    let quiz = match result {
        Ok(quiz) => quiz,
        Err(e) => {
            error!("Quiz generation failed: {}", e);
            return Transition::stay(state);
        }
    };
    let Some(module_id) = state.current_module_id.clone() else {
        return Transition::stay(state);
    };

    Transition::stay(SessionState {
        view: View::Quiz,
        quiz: Some(QuizRun::new(quiz, module_id)),
        ..state
    })
}

fn answer_and_advance(state: SessionState, option: usize) -> Transition {
    if state.view != View::Quiz {
        return Transition::stay(state);
    }
    let Some(run) = state.quiz.as_ref() else {
        return Transition::stay(state);
    };
    if run.outcome.is_some() {
        return Transition::stay(state);
    }
    let Some(question) = run.quiz.questions().get(run.current_index()) else {
        return Transition::stay(state);
    };
    if option >= question.options.len() {
        debug!("Answer option {} is out of range", option);
        return Transition::stay(state);
    }

    let mut answers = run.answers.clone();
    answers.push(option);
    if answers.len() < run.quiz.len() {
        let run = QuizRun {
            answers,
            ..run.clone()
        };
        return Transition::stay(SessionState {
            quiz: Some(run),
            ..state
        });
    }

    let outcome = QuizOutcome::grade(&run.quiz, &answers);
    let run = QuizRun {
        answers,
        outcome: Some(outcome),
        ..run.clone()
    };
    let (Some(profile), Some(path)) = (state.profile.clone(), state.path.clone()) else {
        return Transition::stay(SessionState {
            quiz: Some(run),
            ..state
        });
    };

    let mut performance = profile
        .performance
        .with_quiz_result(outcome.score, outcome.total);
    let mut path = path;
    if outcome.passed {
        if let Some(module) = path.module(&run.module_id) {
            performance = performance.with_completed_topic(&module.title);
        }
        path = path.with_module_completed(&run.module_id);
    }
    let profile = profile.with_performance(performance);

    info!(
        "Quiz finished: {}/{} ({})",
        outcome.score,
        outcome.total,
        if outcome.passed { "passed" } else { "not passed" }
    );
    Transition::with(
        SessionState {
            profile: Some(profile.clone()),
            path: Some(path.clone()),
            quiz: Some(run),
            ..state
        },
        vec![Effect::Persist { profile, path }],
    )
}

fn exit_quiz(state: SessionState) -> Transition {
    if state.view != View::Quiz {
        return Transition::stay(state);
    }
    Transition::stay(SessionState {
        view: View::Dashboard,
        quiz: None,
        ..state
    })
}

fn logout() -> Transition {
    info!("Logging out and clearing saved session");
    Transition::with(SessionState::default(), vec![Effect::ClearPersistence])
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Returns a copy of the transcript with one more message. Timestamps never go backwards.
fn appended(transcript: &[Message], role: Role, content: &str, now: DateTime<Utc>) -> Vec<Message> {
    let at = transcript
        .last()
        .map_or(now, |last| last.created_at.max(now));
    let mut next = transcript.to_vec();
    next.push(Message::new(role, content, at));
    next
}

/// Whole minutes between two instants, rounded to nearest and never negative.
fn elapsed_minutes(started: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let millis = (now - started).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as u32
}
