use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound cloud-function event: path + method, an optional JSON body, and
/// query parameters. This is the wire shape the gateway routes on; the HTTP
/// listener is only a transport that produces these.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub query_string_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl GatewayResponse {
    pub fn new(status_code: u16, headers: HashMap<String, String>, body: Option<&Value>) -> Self {
        Self {
            status_code,
            headers,
            body: body.map(Value::to_string).unwrap_or_default(),
        }
    }
}

/// The fixed cross-origin header set stamped on every response, errors
/// included.
pub fn cors_headers(origin: &str) -> HashMap<String, String> {
    HashMap::from([
        ("Access-Control-Allow-Origin".to_string(), origin.to_string()),
        (
            "Access-Control-Allow-Methods".to_string(),
            "GET,POST,OPTIONS".to_string(),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type,Authorization".to_string(),
        ),
        (
            "Access-Control-Allow-Credentials".to_string(),
            "true".to_string(),
        ),
    ])
}
