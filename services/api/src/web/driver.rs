//! services/api/src/web/driver.rs
//!
//! The shell around the session state machine. It applies events under a lock,
//! then executes the resulting effects against the gateway and the store and feeds
//! gateway results back in as completion events.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use tutor_core::machine::{self, Effect, Event, SessionState};
use tutor_core::persistence::SessionRepository;
use tutor_core::ports::TutorGateway;

//=========================================================================================
// Clock
//=========================================================================================

/// A simple clock abstraction for deterministic time in the driver and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }

    /// Moves a fixed clock forward. Has no effect on `Clock::System`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(at) = self {
            *at += delta;
        }
    }
}

//=========================================================================================
// SessionDriver
//=========================================================================================

/// Owns the live session state for one learner and runs its effects.
pub struct SessionDriver {
    state: Mutex<SessionState>,
    clock: std::sync::Mutex<Clock>,
    gateway: Arc<dyn TutorGateway>,
    repository: SessionRepository,
}

impl SessionDriver {
    /// Restores any saved session and starts the initial effects.
    ///
    /// A store failure while loading is logged and treated as "nothing saved".
    pub async fn boot(
        gateway: Arc<dyn TutorGateway>,
        repository: SessionRepository,
        clock: Clock,
    ) -> Arc<Self> {
        let saved = match repository.load().await {
            Ok(saved) => saved,
            Err(e) => {
                error!("Failed to load saved session, starting fresh: {}", e);
                None
            }
        };

        let transition = machine::boot(saved);
        info!("Session starts on {:?}", transition.state.view());
        let driver = Arc::new(Self {
            state: Mutex::new(transition.state),
            clock: std::sync::Mutex::new(clock),
            gateway,
            repository,
        });
        driver.run_effects(transition.effects).await;
        driver
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self.clock.lock() {
            Ok(clock) => clock.now(),
            Err(poisoned) => poisoned.into_inner().now(),
        }
    }

    /// Advances a fixed clock; used to simulate elapsed session time.
    pub fn advance_clock(&self, delta: Duration) {
        match self.clock.lock() {
            Ok(mut clock) => clock.advance(delta),
            Err(poisoned) => poisoned.into_inner().advance(delta),
        }
    }

    /// A copy of the current state.
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Applies a user event and everything it waits on, then returns the resulting state.
    ///
    /// Blocking gateway calls are awaited here with the state lock released, so other
    /// requests observe the loading state in the meantime.
    pub async fn dispatch(self: &Arc<Self>, event: Event) -> SessionState {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let calls = self.apply(event).await;
            for call in calls {
                if let Some(follow_up) = self.call_gateway(call).await {
                    queue.push_back(follow_up);
                }
            }
        }
        self.state().await
    }

    /// Steps the machine and returns the gateway calls it asked for.
    ///
    /// Storage effects run before the state lock is released, so saves and clears reach
    /// the store in the same order as the transitions that produced them.
    async fn apply(&self, event: Event) -> Vec<Effect> {
        let now = self.now();
        let mut state = self.state.lock().await;
        let transition = machine::step(std::mem::take(&mut *state), event, now);
        *state = transition.state;

        let (storage, calls): (Vec<_>, Vec<_>) = transition
            .effects
            .into_iter()
            .partition(Effect::is_storage);
        for effect in storage {
            self.write_storage(effect).await;
        }
        calls
    }

    async fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            if effect.is_storage() {
                self.write_storage(effect).await;
            } else if let Some(follow_up) = self.call_gateway(effect).await {
                self.dispatch(follow_up).await;
            }
        }
    }

    /// Runs one gateway call. Returns the completion event for calls the caller waits on.
    async fn call_gateway(self: &Arc<Self>, effect: Effect) -> Option<Event> {
        match effect {
            Effect::SynthesizePath {
                request,
                purpose,
                profile,
            } => {
                let result = self.gateway.synthesize_path(&profile).await;
                Some(Event::PathSynthesized {
                    request,
                    purpose,
                    profile,
                    result,
                })
            }
            Effect::SuggestTopics { request, profile } => {
                // Suggestions never block the dashboard.
                let driver = Arc::clone(self);
                tokio::spawn(async move {
                    let result = driver.gateway.suggest_topics(&profile).await;
                    driver
                        .apply_detached(Event::TopicsSuggested { request, result })
                        .await;
                });
                None
            }
            Effect::TutorReply {
                request,
                transcript,
                profile,
                module_title,
            } => {
                let result = self
                    .gateway
                    .tutor_reply(&transcript, &profile, &module_title)
                    .await;
                Some(Event::TutorReplied { request, result })
            }
            Effect::GenerateQuiz {
                request,
                profile,
                module_title,
            } => {
                let result = self.gateway.generate_quiz(&profile, &module_title).await;
                Some(Event::QuizGenerated { request, result })
            }
            Effect::Persist { .. } | Effect::ClearPersistence => {
                self.write_storage(effect).await;
                None
            }
        }
    }

    async fn write_storage(&self, effect: Effect) {
        match effect {
            Effect::Persist { profile, path } => {
                if let Err(e) = self.repository.save(&profile, &path).await {
                    error!("Failed to persist session: {}", e);
                } else {
                    debug!("Session persisted");
                }
            }
            Effect::ClearPersistence => {
                if let Err(e) = self.repository.clear().await {
                    error!("Failed to clear saved session: {}", e);
                }
            }
            other => debug!("Not a storage effect: {:?}", other),
        }
    }

    /// Applies a completion that arrives outside any request.
    async fn apply_detached(&self, event: Event) {
        let calls = self.apply(event).await;
        // Only suggestion results arrive here, and they never ask for more calls.
        debug_assert!(calls.is_empty(), "background completion asked for {:?}", calls);
    }
}
