pub mod domain;
pub mod fallback;
pub mod machine;
pub mod persistence;
pub mod ports;

pub use domain::{
    KnowledgeLevel, LearningGoal, LearningPath, LearningStyle, Message, Module, ModuleStatus,
    PerformanceData, Quiz, QuizOutcome, QuizQuestion, Role, SessionFeedback, Source, UserProfile,
};
pub use fallback::FallbackGateway;
pub use machine::{
    Effect, Event, PathPurpose, PendingCall, RequestId, SessionState, Transition, View,
};
pub use persistence::{MemoryStore, SessionRepository};
pub use ports::{KeyValueStore, PortError, PortResult, TutorGateway};
