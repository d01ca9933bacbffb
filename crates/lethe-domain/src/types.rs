use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditLog;
use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(s: impl Into<String>) -> Self {
        RequestId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Subject fingerprint ───────────────────────────────────────────────────────

/// A pseudonymous subject identity: the SHA-256 digest of the raw patient id,
/// as 64 lowercase hex characters. The orchestrator never handles anything
/// else; a `SubjectHash` can only be obtained through [`SubjectHash::parse`],
/// which is the sole defense against predicate injection when the value is
/// interpolated into query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubjectHash(String);

impl SubjectHash {
    /// Accepts exactly the character class `^[0-9a-f]{64}$`.
    pub fn parse(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        if s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(SubjectHash(s))
        } else {
            Err(DomainError::InvalidSubjectHash(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines.
    pub fn abbrev(&self) -> &str {
        &self.0[..16]
    }
}

impl std::fmt::Display for SubjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for SubjectHash {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        SubjectHash::parse(s).map_err(serde::de::Error::custom)
    }
}

// ── Request status ────────────────────────────────────────────────────────────

/// The lifecycle state of an erasure request.
///
/// Transitions:
///   Pending → Approved       (authorizing collaborator)
///   Approved → Processing    (orchestrator claims the request)
///   Processing → Completed | Failed
///
/// Completed and Failed are terminal and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Approved, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                // A malformed request is failed directly from Approved.
                | (Approved, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Processing => "PROCESSING",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "PROCESSING" => Ok(RequestStatus::Processing),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "FAILED" => Ok(RequestStatus::Failed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

// ── Erasure request ───────────────────────────────────────────────────────────

/// A right-to-erasure request as persisted in the request log.
///
/// `patient_id_hash` is kept as the raw wire string: the log is written by
/// external collaborators and may carry malformed values, which the pipeline
/// rejects with `INVALID_INPUT` at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErasureRequest {
    pub request_id: RequestId,
    pub patient_id_hash: String,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only when the request reaches Completed.
    pub completed_at: Option<DateTime<Utc>>,
    pub requester: String,
    /// Set only when the request reaches Failed.
    pub error_message: Option<String>,
    pub audit_log: Option<AuditLog>,
}

impl ErasureRequest {
    pub fn new(
        request_id: RequestId,
        patient_id_hash: impl Into<String>,
        requester: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            patient_id_hash: patient_id_hash.into(),
            status: RequestStatus::Pending,
            requested_at: now,
            updated_at: now,
            completed_at: None,
            requester: requester.into(),
            error_message: None,
            audit_log: None,
        }
    }
}

// ── Partition ─────────────────────────────────────────────────────────────────

/// A `(year, month, day)` directory in the curated columnar dataset.
///
/// The components are kept as strings because they are partition column
/// values, zero-padding included (`month = "01"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl PartitionKey {
    pub fn new(year: impl Into<String>, month: impl Into<String>, day: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            month: month.into(),
            day: day.into(),
        }
    }

    /// Object-store prefix of the live partition data.
    pub fn dest_prefix(&self) -> String {
        format!(
            "curated/year={}/month={}/day={}/",
            self.year, self.month, self.day
        )
    }

    /// Catalog name for a staging table produced while rewriting this
    /// partition. The nonce keeps retried attempts from colliding.
    pub fn staging_table(&self, nonce: i64) -> String {
        format!(
            "temp_erasure_{}_{}_{}_{}",
            self.year, self.month, self.day, nonce
        )
    }

    /// Object-store prefix a staging table writes its file set under.
    pub fn staging_prefix(table: &str) -> String {
        format!("temp-erasure/{}/", table)
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "year={}/month={}/day={}", self.year, self.month, self.day)
    }
}
