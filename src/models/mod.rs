pub mod card;
pub mod chat;
pub mod job;
pub mod source;

pub use card::{Card, Deck, Difficulty, ProcessingStats};
pub use chat::ChatMessage;
pub use job::{JobMode, JobRecord, JobStage};
pub use source::{Chunk, Source, SourceType};
