pub mod settings;

pub use settings::{
    GenerationConfig, GenerationMode, LlmConfig, PromptsConfig, ServerConfig, Settings,
    SummaryConfig, TextProcessingConfig, TokenEstimatorKind,
};
