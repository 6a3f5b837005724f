use serde::Serialize;
use serde_json::{Value, json};

/// Structured tool error payload, as returned to MCP clients.
/// `error` is a stable machine code from [`codes`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which tool parameter caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Hint about how to recover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Variant-specific data (HTTP status, CGI type code, missing key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Error codes surfaced in tool results
pub mod codes {
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const UPSTREAM_HTTP_ERROR: &str = "upstream_http_error";
    pub const DECODE_ERROR: &str = "decode_error";
    pub const UPSTREAM_API_ERROR: &str = "upstream_api_error";
    pub const SCHEMA_MISMATCH: &str = "schema_mismatch";
}

/// Everything that can go wrong between a tool call and its payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NagiosError {
    /// Bad, missing or unknown tool parameters. Raised before any request is made.
    #[error("invalid argument '{field}': {message}")]
    InvalidArgument { field: String, message: String },
    /// Connection failure, timeout or an interrupted response body.
    #[error("failed to reach Nagios: {0}")]
    Transport(String),
    /// Nagios answered with something other than 200.
    #[error("Nagios responded with HTTP {status}")]
    UpstreamHttp { status: u16 },
    /// The body was not JSON.
    #[error("Nagios response is not valid JSON: {0}")]
    Decode(String),
    /// Valid JSON, but the CGI reported a failure in its `result` wrapper.
    #[error("Nagios CGI error (type_code {type_code}): {message}")]
    UpstreamApi { type_code: i64, message: String },
    /// A successful response without the expected wrapper or payload key.
    #[error("Nagios response is missing expected key '{key}'")]
    SchemaMismatch { key: String },
}

impl NagiosError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn schema_mismatch(key: impl Into<String>) -> Self {
        Self::SchemaMismatch { key: key.into() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            Self::Transport(_) => codes::TRANSPORT_ERROR,
            Self::UpstreamHttp { .. } => codes::UPSTREAM_HTTP_ERROR,
            Self::Decode(_) => codes::DECODE_ERROR,
            Self::UpstreamApi { .. } => codes::UPSTREAM_API_ERROR,
            Self::SchemaMismatch { .. } => codes::SCHEMA_MISMATCH,
        }
    }

    fn docs_hint(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => {
                "Check the tool's inputSchema from tools/list and retry with corrected arguments."
            }
            Self::Transport(_) => {
                "Ensure the Nagios web server is reachable and NAGIOS_URL points to its web root."
            }
            Self::UpstreamHttp { status: 401 | 403 } => {
                "Check NAGIOS_USER/NAGIOS_PASS and the CGI authorization settings in cgi.cfg."
            }
            Self::UpstreamHttp { status: 404 } => {
                "Check NAGIOS_URL and NAGIOS_CGI_PATH; the JSON CGIs require Nagios Core 4.x."
            }
            Self::UpstreamHttp { .. } => "The Nagios web server rejected the request.",
            Self::Decode(_) => {
                "The CGI path may be serving HTML (login page or error page) instead of JSON."
            }
            Self::UpstreamApi { .. } => {
                "The object or filter may not exist; verify names with get_object_list_config."
            }
            Self::SchemaMismatch { .. } => {
                "The Nagios JSON API version may differ from the one this server expects."
            }
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::UpstreamHttp { status } => Some(json!({ "status": status })),
            Self::UpstreamApi { type_code, .. } => Some(json!({ "type_code": type_code })),
            Self::SchemaMismatch { key } => Some(json!({ "missing_key": key })),
            Self::InvalidArgument { .. } | Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let field = match self {
            Self::InvalidArgument { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorPayload {
            error: self.code().to_string(),
            message: self.to_string(),
            field,
            docs_hint: Some(self.docs_hint().to_string()),
            details: self.details(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.to_payload()).unwrap_or(Value::Null)
    }
}
