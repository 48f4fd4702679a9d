//! JSON-RPC 2.0 message envelope (spec.md §4.4, §6 "LSP wire protocol").
//!
//! Request/response bodies are kept as [`serde_json::Value`] rather than
//! strongly-typed per-method structs: several responses are shape-ambiguous
//! by design (diagnostics may arrive as a bare array or as `{ items: [...] }`,
//! hover contents may be a string, an array, or an object — see spec.md
//! §4.4.5/§4.4.6), and a `Value` is the natural representation for "parse
//! whichever shape shows up, not a declared one".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request id. May be an integer or a string; both round-trip
/// unchanged (spec.md §4.4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl OutgoingRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl OutgoingNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub result: Value,
}

impl OutgoingResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Method not found, the one error code the client checks explicitly
/// (spec.md §4.4.5: disables pull diagnostics permanently).
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A single decoded frame from the server, before we know whether it's a
/// response, a server-to-client request, or a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl IncomingMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// A response (to a request this client sent) carries an id but no
    /// method; a request or notification from the server carries a method.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    /// Server-to-client request: has both an id and a method.
    pub fn is_server_request(&self) -> bool {
        self.id.is_some() && self.method.is_some()
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }
}

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("json-rpc payloads are always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_roundtrips_integer_and_string() {
        let int_id: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(int_id, RequestId::Number(42));
        assert_eq!(serde_json::to_string(&int_id).unwrap(), "42");

        let str_id: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(str_id, RequestId::String("abc".into()));
        assert_eq!(serde_json::to_string(&str_id).unwrap(), "\"abc\"");
    }

    #[test]
    fn classifies_response_vs_request_vs_notification() {
        let response = IncomingMessage::parse(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(response.is_response());

        let server_request =
            IncomingMessage::parse(br#"{"jsonrpc":"2.0","id":2,"method":"workspace/configuration","params":{}}"#)
                .unwrap();
        assert!(server_request.is_server_request());

        let notification =
            IncomingMessage::parse(br#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#)
                .unwrap();
        assert!(notification.is_notification());
    }

    #[test]
    fn error_code_is_decoded() {
        let msg = IncomingMessage::parse(
            br#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"not found"}}"#,
        )
        .unwrap();
        assert_eq!(msg.error.unwrap().code, METHOD_NOT_FOUND);
    }
}
