use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::record::SourceRecord;
use crate::storage::LocalStore;

/// Request body as it arrives on the wire
///
/// Older clients send capitalized field names.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawRequest {
    #[serde(alias = "Id")]
    pub id: u64,
    #[serde(alias = "Method")]
    pub method: String,
    #[serde(default, alias = "Params")]
    pub params: Value,
}

/// Supported agent methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRequest {
    /// Read one persisted record back as its field map
    Get { key: String },
}

impl AgentRequest {
    /// Validates method name and params shape
    pub fn parse(
        method: &str,
        params: Value,
    ) -> std::result::Result<Self, String> {
        match method {
            "Get" | "get" => {
                let key = match params {
                    Value::String(key) => key,
                    // single-element positional params
                    Value::Array(mut items) if items.len() == 1 => match items.pop() {
                        Some(Value::String(key)) => key,
                        _ => return Err("Get expects a string key".to_string()),
                    },
                    _ => return Err("Get expects a string key".to_string()),
                };
                Ok(AgentRequest::Get { key })
            }
            other => Err(format!("unknown method: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: u64,
    pub result: Value,
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn ok(
        id: u64,
        result: Value,
    ) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(
        id: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Serves one request against the local store
pub fn handle_request<S: LocalStore + ?Sized>(
    store: &S,
    request: RawRequest,
) -> AgentResponse {
    let id = request.id;
    match AgentRequest::parse(&request.method, request.params) {
        Ok(AgentRequest::Get { key }) => match get_record(store, &key) {
            Ok(Some(record)) => match serde_json::to_value(record) {
                Ok(value) => AgentResponse::ok(id, value),
                Err(e) => AgentResponse::err(id, e.to_string()),
            },
            // absent key: null result and null error
            Ok(None) => AgentResponse::ok(id, Value::Null),
            Err(e) => AgentResponse::err(id, e.to_string()),
        },
        Err(e) => AgentResponse::err(id, e),
    }
}

fn get_record<S: LocalStore + ?Sized>(
    store: &S,
    key: &str,
) -> crate::Result<Option<SourceRecord>> {
    match store.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(SourceRecord::from_persisted(&bytes)?)),
        None => Ok(None),
    }
}
