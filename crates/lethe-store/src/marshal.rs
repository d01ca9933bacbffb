//! DynamoDB attribute-value marshalling for [`ErasureRequest`].

use chrono::{DateTime, Utc};
use lethe_domain::{ErasureRequest, RequestId, RequestStatus};
use serde_json::{json, Value};

use crate::error::StoreError;

pub(crate) fn s(v: impl Into<String>) -> Value {
    json!({ "S": v.into() })
}

fn get_s<'a>(item: &'a Value, attr: &str) -> Option<&'a str> {
    item[attr]["S"].as_str()
}

fn require_s(item: &Value, attr: &str) -> Result<String, StoreError> {
    get_s(item, attr)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Malformed(format!("missing string attribute '{}'", attr)))
}

fn parse_ts(raw: &str, attr: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed(format!("bad timestamp in '{}': {}", attr, e)))
}

pub(crate) fn to_item(request: &ErasureRequest) -> Result<Value, StoreError> {
    let mut item = json!({
        "request_id": s(request.request_id.as_str()),
        "patient_id_hash": s(&request.patient_id_hash),
        "status": s(request.status.as_str()),
        "requested_at": s(request.requested_at.to_rfc3339()),
        "updated_at": s(request.updated_at.to_rfc3339()),
        "requester": s(&request.requester),
    });
    if let Some(at) = request.completed_at {
        item["completed_at"] = s(at.to_rfc3339());
    }
    if let Some(msg) = &request.error_message {
        item["error_message"] = s(msg);
    }
    if let Some(audit) = &request.audit_log {
        item["audit_log"] = s(audit.to_json_string()?);
    }
    Ok(item)
}

pub(crate) fn from_item(item: &Value) -> Result<ErasureRequest, StoreError> {
    let status: RequestStatus = require_s(item, "status")?
        .parse()
        .map_err(|e| StoreError::Malformed(format!("{}", e)))?;

    let audit_log = match get_s(item, "audit_log") {
        Some(raw) => Some(serde_json::from_str(raw)?),
        None => None,
    };

    Ok(ErasureRequest {
        request_id: RequestId::new(require_s(item, "request_id")?),
        patient_id_hash: require_s(item, "patient_id_hash")?,
        status,
        requested_at: parse_ts(&require_s(item, "requested_at")?, "requested_at")?,
        updated_at: parse_ts(&require_s(item, "updated_at")?, "updated_at")?,
        completed_at: get_s(item, "completed_at")
            .map(|raw| parse_ts(raw, "completed_at"))
            .transpose()?,
        requester: require_s(item, "requester")?,
        error_message: get_s(item, "error_message").map(str::to_string),
        audit_log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lethe_domain::AuditLog;

    fn request() -> ErasureRequest {
        let mut r = ErasureRequest::new(
            RequestId::new("req-1"),
            "ab".repeat(32),
            "dpo@example.org",
            Utc::now(),
        );
        r.status = RequestStatus::Completed;
        r.completed_at = Some(r.requested_at);
        r.audit_log = Some(AuditLog::begin(r.request_id.clone(), r.requested_at));
        r
    }

    #[test]
    fn round_trips_through_item_form() {
        let r = request();
        let item = to_item(&r).unwrap();
        assert_eq!(item["status"]["S"], "COMPLETED");
        // audit_log is a serialized JSON string attribute
        assert!(item["audit_log"]["S"].as_str().unwrap().starts_with('{'));

        let back = from_item(&item).unwrap();
        assert_eq!(back.request_id, r.request_id);
        assert_eq!(back.status, r.status);
        assert_eq!(back.audit_log, r.audit_log);
        assert_eq!(back.requested_at, r.requested_at);
    }

    #[test]
    fn missing_required_attribute_is_malformed() {
        let item = json!({ "request_id": s("req-1") });
        assert!(matches!(from_item(&item), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn unknown_status_is_malformed() {
        let r = request();
        let mut item = to_item(&r).unwrap();
        item["status"] = s("EXPUNGED");
        assert!(matches!(from_item(&item), Err(StoreError::Malformed(_))));
    }
}
