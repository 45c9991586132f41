pub mod evidence;
pub mod fetch;
pub mod post;
pub mod settings;
pub mod slack;
pub mod summarize;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use evidence::{EvidenceAggregator, EvidenceBudget};
pub use post::{PostExecutor, PostInput};
pub use settings::{load_settings, SettingsError, WorkerSettings};
pub use slack::SlackWebhookSink;
pub use worker::{Collaborators, Stage, Worker};
