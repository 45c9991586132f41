pub mod backend;
pub mod chat;
pub mod error;
pub mod mock;
pub mod normalizer;
pub mod parse;
pub mod prompt;

pub use backend::{BackendSettings, ProviderKind, SummaryBackend};
pub use error::LlmError;
pub use normalizer::{SummaryInput, SummaryNormalizer};
pub use parse::{parse_summary, SummaryPayload};
