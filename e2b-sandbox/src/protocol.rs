//! JSON-RPC 2.0 wire types, method names, and encode/decode helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Method and subscription names
// ---------------------------------------------------------------------------

pub mod method {
    pub const FILESYSTEM_WRITE: &str = "filesystem_write";
    pub const FILESYSTEM_READ: &str = "filesystem_read";
    pub const FILESYSTEM_WRITE_BASE64: &str = "filesystem_writeBase64";
    pub const FILESYSTEM_READ_BASE64: &str = "filesystem_readBase64";
    pub const FILESYSTEM_LIST: &str = "filesystem_list";
    pub const FILESYSTEM_MAKE_DIR: &str = "filesystem_makeDir";
    pub const FILESYSTEM_REMOVE: &str = "filesystem_remove";
    pub const FILESYSTEM_SUBSCRIBE: &str = "filesystem_subscribe";
    pub const FILESYSTEM_UNSUBSCRIBE: &str = "filesystem_unsubscribe";
    pub const PROCESS_START: &str = "process_start";
    pub const PROCESS_SUBSCRIBE: &str = "process_subscribe";
    pub const PROCESS_UNSUBSCRIBE: &str = "process_unsubscribe";
    pub const PROCESS_KILL: &str = "process_kill";
    pub const PROCESS_WRITE_STDIN: &str = "process_writeStdin";
}

pub mod subscription {
    pub const WATCH_DIR: &str = "watchDir";
    pub const ON_STDOUT: &str = "onStdout";
    pub const ON_STDERR: &str = "onStderr";
    pub const ON_EXIT: &str = "onExit";
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationParams {
    pub subscription: String,
    pub result: Value,
}

/// Any frame the server sends: a response (`id` plus `result` or `error`) or
/// a subscription notification (`method` plus `params`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<NotificationParams>,
}

impl ServerMessage {
    pub fn response(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn error(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            ..Default::default()
        }
    }

    pub fn notification(method: &str, subscription: &str, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            method: Some(method.to_string()),
            params: Some(NotificationParams {
                subscription: subscription.to_string(),
                result,
            }),
            ..Default::default()
        }
    }
}

/// One line of process output as pushed on `onStdout` / `onStderr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub line: String,
    pub timestamp: i64,
    pub error: bool,
}

impl OutputEvent {
    pub fn is_stderr(&self) -> bool {
        self.error || self.kind == "Stderr"
    }
}

// ---------------------------------------------------------------------------
// Encode / decode helpers
// ---------------------------------------------------------------------------

pub fn encode_request(id: u64, method: &str, params: Vec<Value>) -> Result<String, Error> {
    let req = Request {
        jsonrpc: JSONRPC_VERSION.to_string(),
        method: method.to_string(),
        params,
        id,
    };
    Ok(serde_json::to_string(&req)?)
}

pub fn decode_message(text: &str) -> Result<ServerMessage, Error> {
    Ok(serde_json::from_str(text)?)
}

/// Turn a JSON-RPC error object into the most specific [`Error`].
///
/// The service reports filesystem failures as Go error strings, so the
/// classification goes by message text.
pub fn rpc_error(err: RpcError) -> Error {
    let lower = err.message.to_lowercase();
    if is_missing_path(&lower) {
        Error::NotFound(err.message)
    } else if lower.contains("permission denied") {
        Error::PermissionDenied(err.message)
    } else {
        Error::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

/// Filesystem errors only. A missing executable is reported by the process
/// layer with similar wording and stays an RPC error.
fn is_missing_path(lower: &str) -> bool {
    lower.contains("no such file or directory")
        || (lower.contains("file not found") && !lower.contains("executable file not found"))
}

/// Method that releases a subscription created by `subscribe`.
pub fn unsubscribe_method(subscribe: &str) -> Option<&'static str> {
    match subscribe {
        method::FILESYSTEM_SUBSCRIBE => Some(method::FILESYSTEM_UNSUBSCRIBE),
        method::PROCESS_SUBSCRIBE => Some(method::PROCESS_UNSUBSCRIBE),
        _ => None,
    }
}

/// Exit code from an `onExit` notification: a bare integer, or an object
/// carrying `exitCode`.
pub fn parse_exit_code(result: &Value) -> Option<i32> {
    let code = result
        .as_i64()
        .or_else(|| result.get("exitCode").and_then(Value::as_i64))?;
    i32::try_from(code).ok()
}
