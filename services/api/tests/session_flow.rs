//! End-to-end session flows through the driver, with a scripted gateway and an
//! in-memory store.

use async_trait::async_trait;
use axum::{extract::State, Json};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tutor_api_lib::config::Config;
use tutor_api_lib::web::driver::{Clock, SessionDriver};
use tutor_api_lib::web::protocol::ClientEvent;
use tutor_api_lib::web::state::AppState;
use tutor_api_lib::web::{get_session_handler, post_event_handler};
use tutor_core::persistence::{PATH_KEY, PROFILE_KEY};
use tutor_core::{
    Event, FallbackGateway, KeyValueStore, KnowledgeLevel, LearningGoal, LearningPath,
    LearningStyle, MemoryStore, Message, Module, ModuleStatus, PerformanceData, PortError,
    PortResult, Quiz, QuizQuestion, SessionFeedback, SessionRepository, SessionState,
    TutorGateway, UserProfile, View,
};

//=========================================================================================
// Test Doubles
//=========================================================================================

/// Builds a two-module path named after the profile's topic. Every quiz answer is `0`.
struct ScriptedGateway;

#[async_trait]
impl TutorGateway for ScriptedGateway {
    async fn synthesize_path(&self, profile: &UserProfile) -> PortResult<LearningPath> {
        let module = |n: u32| Module {
            id: format!("m{n}"),
            title: format!("{} part {n}", profile.topic),
            description: format!("Step {n} of {}", profile.topic),
            status: ModuleStatus::Current,
            topics: vec![profile.topic.clone()],
            video_url: None,
            sources: Vec::new(),
        };
        LearningPath::new(vec![module(1), module(2)], 3, "Paced for daily practice")
            .map_err(|e| PortError::InvalidResponse(e.to_string()))
    }

    async fn suggest_topics(&self, profile: &UserProfile) -> PortResult<Vec<String>> {
        Ok(vec![
            format!("{} in practice", profile.subject),
            "Optics".to_string(),
        ])
    }

    async fn tutor_reply(
        &self,
        transcript: &[Message],
        _profile: &UserProfile,
        module_title: &str,
    ) -> PortResult<String> {
        Ok(format!(
            "What do you already know about {module_title}? ({} messages so far)",
            transcript.len()
        ))
    }

    async fn generate_quiz(&self, _profile: &UserProfile, module_title: &str) -> PortResult<Quiz> {
        let questions = (1..=5)
            .map(|n| QuizQuestion {
                question: format!("{module_title}: question {n}"),
                options: vec!["right".into(), "wrong".into(), "also wrong".into()],
                correct_answer: 0,
                explanation: "The first option is always right here.".to_string(),
            })
            .collect();
        Quiz::new(format!("{module_title} check"), questions)
            .map_err(|e| PortError::InvalidResponse(e.to_string()))
    }
}

/// A provider that is always down.
struct OfflineGateway;

#[async_trait]
impl TutorGateway for OfflineGateway {
    async fn synthesize_path(&self, _profile: &UserProfile) -> PortResult<LearningPath> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn suggest_topics(&self, _profile: &UserProfile) -> PortResult<Vec<String>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn tutor_reply(
        &self,
        _transcript: &[Message],
        _profile: &UserProfile,
        _module_title: &str,
    ) -> PortResult<String> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn generate_quiz(&self, _profile: &UserProfile, _module_title: &str) -> PortResult<Quiz> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }
}

/// Wraps a `MemoryStore` and holds every save for `delay` before writing it.
#[derive(Clone)]
struct SlowSaveStore {
    inner: MemoryStore,
    delay: std::time::Duration,
}

#[async_trait]
impl KeyValueStore for SlowSaveStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put_all(&self, entries: &[(&str, String)]) -> PortResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_all(entries).await
    }

    async fn delete_all(&self, keys: &[&str]) -> PortResult<()> {
        self.inner.delete_all(keys).await
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 16, 30, 0).unwrap()
}

fn draft(topic: &str) -> UserProfile {
    UserProfile {
        name: "Sam".to_string(),
        class_name: "Grade 11".to_string(),
        subject: "Physics".to_string(),
        level: KnowledgeLevel::Intermediate,
        goal: LearningGoal::ExamPrep,
        learning_style: LearningStyle::Video,
        time_per_day: 45,
        topic: topic.to_string(),
        language: "English".to_string(),
        performance: PerformanceData::default(),
    }
}

async fn driver_with(gateway: Arc<dyn TutorGateway>, store: &MemoryStore) -> Arc<SessionDriver> {
    let repository = SessionRepository::new(Arc::new(store.clone()));
    SessionDriver::boot(gateway, repository, Clock::Fixed(t0())).await
}

async fn onboarded(store: &MemoryStore) -> Arc<SessionDriver> {
    let driver = driver_with(Arc::new(ScriptedGateway), store).await;
    driver.dispatch(Event::Start).await;
    driver
        .dispatch(Event::CompleteOnboarding(draft("Thermodynamics")))
        .await;
    driver
}

/// Suggestions are fetched in the background; poll until they land.
async fn wait_for_suggestions(driver: &SessionDriver) -> SessionState {
    for _ in 0..100 {
        let state = driver.state().await;
        if !state.suggestions().is_empty() {
            return state;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("topic suggestions never arrived");
}

async fn answer_all(driver: &Arc<SessionDriver>, answers: [usize; 5]) -> SessionState {
    let mut state = driver.state().await;
    for option in answers {
        state = driver.dispatch(Event::AnswerAndAdvance(option)).await;
    }
    state
}

//=========================================================================================
// Flows
//=========================================================================================

#[tokio::test]
async fn onboarding_builds_and_saves_a_path() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;

    let state = driver.state().await;
    assert_eq!(state.view(), View::Dashboard);
    assert!(!state.is_loading());
    assert_eq!(
        state.current_module().map(|m| m.id.as_str()),
        Some("m1")
    );
    assert_eq!(state.profile().map(|p| p.name.as_str()), Some("Sam"));

    assert!(store.get(PROFILE_KEY).await.unwrap().is_some());
    assert!(store.get(PATH_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn suggestions_arrive_without_blocking_the_dashboard() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;

    let state = wait_for_suggestions(&driver).await;
    assert_eq!(state.suggestions(), ["Physics in practice", "Optics"]);
    assert_eq!(state.view(), View::Dashboard);
}

#[tokio::test]
async fn tutoring_time_and_feedback_survive_a_restart() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;

    driver.dispatch(Event::SelectModule("m2".to_string())).await;
    let state = driver
        .dispatch(Event::SendMessage("Where does heat go?".to_string()))
        .await;
    assert_eq!(state.view(), View::Tutoring);
    assert_eq!(state.transcript().len(), 2);
    assert!(state.transcript()[1]
        .content
        .contains("Thermodynamics part 2"));

    driver.advance_clock(Duration::minutes(12));
    let state = driver.dispatch(Event::EndSession).await;
    assert_eq!(state.view(), View::Feedback);
    assert!(state.transcript().is_empty());

    let state = driver
        .dispatch(Event::SubmitFeedback(SessionFeedback::Medium))
        .await;
    assert_eq!(state.view(), View::Dashboard);

    let restarted = driver_with(Arc::new(ScriptedGateway), &store).await;
    let state = restarted.state().await;
    assert_eq!(state.view(), View::Dashboard);
    let performance = &state.profile().unwrap().performance;
    assert_eq!(performance.last_feedback(), Some(SessionFeedback::Medium));
    assert_eq!(performance.time_spent_minutes(), 12);
}

#[tokio::test]
async fn passing_quiz_completes_the_module() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;

    let state = driver.dispatch(Event::StartQuiz).await;
    assert_eq!(state.view(), View::Quiz);
    assert_eq!(state.quiz().map(|q| q.quiz().len()), Some(5));

    // Four of five is exactly the pass mark.
    let state = answer_all(&driver, [0, 0, 0, 1, 0]).await;
    let outcome = state.quiz().and_then(|q| q.outcome()).unwrap();
    assert_eq!((outcome.score, outcome.total, outcome.passed), (4, 5, true));

    let module = state.path().unwrap().module("m1").unwrap();
    assert!(module.is_completed());
    let performance = &state.profile().unwrap().performance;
    assert_eq!(performance.completed_topics(), ["Thermodynamics part 1"]);
    assert_eq!(performance.average_accuracy(), 80);

    let state = driver.dispatch(Event::ExitQuiz).await;
    assert_eq!(state.view(), View::Dashboard);
    assert!(state.quiz().is_none());

    let saved: LearningPath =
        serde_json::from_str(&store.get(PATH_KEY).await.unwrap().unwrap()).unwrap();
    assert!(saved.module("m1").unwrap().is_completed());
}

#[tokio::test]
async fn failing_quiz_records_the_score_only() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;

    driver.dispatch(Event::StartQuiz).await;
    let state = answer_all(&driver, [0, 1, 0, 1, 0]).await;
    let outcome = state.quiz().and_then(|q| q.outcome()).unwrap();
    assert!(!outcome.passed);

    assert!(!state.path().unwrap().module("m1").unwrap().is_completed());
    let performance = &state.profile().unwrap().performance;
    assert_eq!(performance.quiz_scores(), [3]);
    assert!(performance.completed_topics().is_empty());
    assert_eq!(performance.average_accuracy(), 60);
}

#[tokio::test]
async fn choosing_a_suggestion_replaces_the_path_and_keeps_progress() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;
    driver.dispatch(Event::StartQuiz).await;
    answer_all(&driver, [0; 5]).await;
    driver.dispatch(Event::ExitQuiz).await;
    wait_for_suggestions(&driver).await;

    let state = driver
        .dispatch(Event::SelectSuggestedTopic("Optics".to_string()))
        .await;
    assert_eq!(state.view(), View::Dashboard);
    let profile = state.profile().unwrap();
    assert_eq!(profile.topic, "Optics");
    assert_eq!(profile.performance.quiz_scores(), [5]);

    let path = state.path().unwrap();
    assert_eq!(path.first_module().title, "Optics part 1");
    assert!(path.modules().iter().all(|m| !m.is_completed()));
    assert_eq!(state.current_module().map(|m| m.id.as_str()), Some("m1"));
}

#[tokio::test]
async fn logout_clears_the_saved_session() {
    let store = MemoryStore::new();
    let driver = onboarded(&store).await;

    let state = driver.dispatch(Event::Logout).await;
    assert_eq!(state.view(), View::Welcome);
    assert!(state.profile().is_none());
    assert!(store.get(PROFILE_KEY).await.unwrap().is_none());
    assert!(store.get(PATH_KEY).await.unwrap().is_none());

    let restarted = driver_with(Arc::new(ScriptedGateway), &store).await;
    assert_eq!(restarted.state().await.view(), View::Welcome);
}

#[tokio::test]
async fn logout_during_a_slow_save_leaves_nothing_saved() {
    let store = MemoryStore::new();
    let slow = SlowSaveStore {
        inner: store.clone(),
        delay: std::time::Duration::from_millis(50),
    };
    let repository = SessionRepository::new(Arc::new(slow));
    let driver = SessionDriver::boot(Arc::new(ScriptedGateway), repository, Clock::Fixed(t0())).await;

    driver.dispatch(Event::Start).await;
    driver
        .dispatch(Event::CompleteOnboarding(draft("Optics")))
        .await;
    driver.dispatch(Event::SelectModule("m1".to_string())).await;
    driver.dispatch(Event::EndSession).await;

    let feedback = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move {
            driver
                .dispatch(Event::SubmitFeedback(SessionFeedback::Easy))
                .await
        }
    });
    // Give the feedback save time to start before logging out.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let state = driver.dispatch(Event::Logout).await;
    feedback.await.unwrap();

    assert_eq!(state.view(), View::Welcome);
    assert!(store.get(PROFILE_KEY).await.unwrap().is_none());
    assert!(store.get(PATH_KEY).await.unwrap().is_none());

    let restarted = driver_with(Arc::new(ScriptedGateway), &store).await;
    assert_eq!(restarted.state().await.view(), View::Welcome);
}

#[tokio::test]
async fn offline_provider_still_yields_a_usable_session() {
    let store = MemoryStore::new();
    let gateway = Arc::new(FallbackGateway::new(OfflineGateway));
    let driver = driver_with(gateway, &store).await;

    driver.dispatch(Event::Start).await;
    let state = driver
        .dispatch(Event::CompleteOnboarding(draft("Entropy")))
        .await;
    assert_eq!(state.view(), View::Dashboard);
    let path = state.path().unwrap();
    assert_eq!(path.modules().len(), 1);
    assert_eq!(path.first_module().title, "Introduction to Entropy");

    driver.dispatch(Event::SelectModule(path.first_module().id.clone())).await;
    let state = driver
        .dispatch(Event::SendMessage("Is entropy disorder?".to_string()))
        .await;
    assert_eq!(state.transcript().len(), 2);
    assert!(!state.is_loading());

    // Quiz failures are not papered over: the learner stays on the dashboard.
    driver.dispatch(Event::EndSession).await;
    driver
        .dispatch(Event::SubmitFeedback(SessionFeedback::Hard))
        .await;
    let state = driver.dispatch(Event::StartQuiz).await;
    assert_eq!(state.view(), View::Dashboard);
    assert!(state.quiz().is_none());
    assert!(!state.is_loading());
}

//=========================================================================================
// HTTP Handlers
//=========================================================================================

#[tokio::test]
async fn handlers_apply_client_events_and_hide_answers_until_scored() {
    let store = MemoryStore::new();
    let driver = driver_with(Arc::new(ScriptedGateway), &store).await;
    let config = Config::from_lookup(|_| None).unwrap();
    let state = Arc::new(AppState {
        config: Arc::new(config),
        driver,
    });

    let events = [
        r#"{"type":"start"}"#.to_string(),
        serde_json::json!({"type": "complete_onboarding", "profile": draft("Waves")}).to_string(),
        r#"{"type":"start_quiz"}"#.to_string(),
    ];
    for raw in events {
        let event: ClientEvent = serde_json::from_str(&raw).unwrap();
        post_event_handler(State(state.clone()), Json(event)).await;
    }

    let Json(snapshot) = get_session_handler(State(state.clone())).await;
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["view"], "quiz");
    assert_eq!(json["quiz"]["questionIndex"], 0);
    assert_eq!(json["quiz"]["currentQuestion"]["options"][0], "right");
    assert!(json["quiz"]["currentQuestion"].get("correctAnswer").is_none());
    assert_eq!(json["quiz"]["review"].as_array().map(Vec::len), Some(0));

    for _ in 0..5 {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"answer_and_advance","option_index":0}"#).unwrap();
        post_event_handler(State(state.clone()), Json(event)).await;
    }

    let Json(snapshot) = get_session_handler(State(state)).await;
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["quiz"]["outcome"]["score"], 5);
    assert_eq!(json["quiz"]["outcome"]["passed"], true);
    assert!(json["quiz"]["currentQuestion"].is_null());
    assert_eq!(json["quiz"]["review"][4]["correctAnswer"], 0);
    assert_eq!(json["quiz"]["review"][4]["chosenAnswer"], 0);
}
