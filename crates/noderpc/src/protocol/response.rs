//! Reply objects sent back to callers.
//!
//! Every reply carries all three members: `result` (null on failure), `error`
//! (null on success) and the echoed `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{DispatchError, RpcError};

/// Reply to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonReply {
    /// Result value on success, null on failure.
    pub result: Value,
    /// Error object on failure, null on success.
    pub error: Option<RpcError>,
    /// Request identifier echoed back verbatim.
    pub id: Value,
}

impl JsonReply {
    /// Creates a success reply.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: None,
            id,
        }
    }

    /// Creates an error reply.
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            result: Value::Null,
            error: Some(error),
            id,
        }
    }

    /// Builds a reply from the outcome of a dispatch.
    pub fn from_outcome(id: Value, outcome: Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error.to_rpc_error()),
        }
    }

    /// Converts the reply into a JSON value.
    pub fn into_value(self) -> Value {
        let error = match self.error {
            Some(error) => serde_json::json!({"code": error.code, "message": error.message}),
            None => Value::Null,
        };
        serde_json::json!({
            "result": self.result,
            "error": error,
            "id": self.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::errors::RPC_METHOD_NOT_FOUND;

    #[test]
    fn success_reply_has_null_error() {
        let reply = JsonReply::success(json!(1), json!("ok")).into_value();
        assert_eq!(reply, json!({"result": "ok", "error": null, "id": 1}));
    }

    #[test]
    fn failure_reply_has_null_result() {
        let reply = JsonReply::from_outcome(
            json!("abc"),
            Err(DispatchError::method_not_found("missing")),
        )
        .into_value();
        assert_eq!(
            reply,
            json!({
                "result": null,
                "error": {"code": RPC_METHOD_NOT_FOUND, "message": "Method not found"},
                "id": "abc"
            })
        );
    }

    #[test]
    fn serializes_every_member() {
        let text = serde_json::to_string(&JsonReply::success(Value::Null, json!(3)))
            .expect("serialize reply");
        assert!(text.contains(r#""error":null"#));
        assert!(text.contains(r#""id":null"#));
        assert!(text.contains(r#""result":3"#));
    }
}
