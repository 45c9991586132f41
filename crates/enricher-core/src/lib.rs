pub mod errors;
pub mod ids;
pub mod job;
pub mod json_path;
pub mod policy;
pub mod ports;
pub mod truncate;
pub mod types;

pub use errors::{JobError, PortError};
pub use ids::{ArtifactPtr, JobId, Pointer};
pub use job::{JobContext, JobRequest, JobResult, JobStatus};
pub use policy::{redaction_active, PolicyConstraints};
pub use truncate::truncate_to_bytes;
pub use types::*;
