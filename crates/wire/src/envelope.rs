//! The primary stream's newline-delimited JSON-RPC-like envelope.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: i64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Ok { result: serde_json::Value },
    Err { error: ResponseError },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
}

impl Response {
    pub fn ok(id: i64, result: serde_json::Value) -> Self {
        Self { id, outcome: Outcome::Ok { result } }
    }

    pub fn err(id: i64, error: &chainreview_domain::error::Error) -> Self {
        Self {
            id,
            outcome: Outcome::Err {
                error: ResponseError { code: error.wire_code(), message: error.human_message() },
            },
        }
    }
}

/// Whether a method gets the 600s long deadline or the 120s short one.
/// Everything not named here defaults to short.
pub fn is_long_running(method: &str) -> bool {
    matches!(
        method,
        "review.run" | "chat.query" | "review.validate_finding" | "patch.generate"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserializes_with_defaulted_params() {
        let req: Request = serde_json::from_str(r#"{"id":1,"method":"repo.open"}"#).unwrap();
        assert_eq!(req.id, 1);
        assert_eq!(req.method, "repo.open");
        assert!(req.params.is_null());
    }

    #[test]
    fn ok_response_serializes_result_field() {
        let resp = Response::ok(7, serde_json::json!({"a": 1}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["result"]["a"], 1);
        assert!(v.get("error").is_none());
    }

    #[test]
    fn error_response_serializes_code_and_message() {
        let e = chainreview_domain::error::Error::PathEscape("../etc/passwd".into());
        let resp = Response::err(3, &e);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["error"]["code"], -32003);
        assert!(v.get("result").is_none());
    }

    #[test]
    fn long_running_methods_classified_correctly() {
        assert!(is_long_running("review.run"));
        assert!(is_long_running("chat.query"));
        assert!(!is_long_running("repo.file"));
        assert!(!is_long_running("review.cancel"));
    }
}
