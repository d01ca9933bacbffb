pub mod audit;
pub mod error;
pub mod types;

pub use audit::{AuditLog, PartitionRewrite, RewriteOutcome, RewriteSubStep, StepRecord};
pub use error::DomainError;
pub use types::{ErasureRequest, PartitionKey, RequestId, RequestStatus, SubjectHash};
