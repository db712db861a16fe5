pub mod json_reply;
pub mod kv_store;
pub mod tutor_llm;

pub use kv_store::SqliteKvStore;
pub use tutor_llm::{OpenAiTutorAdapter, TutorModels};
