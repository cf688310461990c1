pub mod error;
pub mod token_estimator;

pub use token_estimator::estimate_tokens;
