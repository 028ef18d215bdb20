use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Kind of filesystem change reported by a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsOperation {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

impl fmt::Display for FsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "Create",
            Self::Write => "Write",
            Self::Remove => "Remove",
            Self::Rename => "Rename",
            Self::Chmod => "Chmod",
        };
        f.write_str(s)
    }
}

/// A filesystem change under a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsEvent {
    /// Full path of the changed file or directory.
    pub path: String,
    /// Base name of the changed file or directory.
    pub name: String,
    pub operation: FsOperation,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub is_dir: bool,
}

/// One line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMessage {
    pub line: String,
    /// `true` when the line came from stderr.
    pub error: bool,
    pub timestamp: i64,
}

/// Everything a process produced, available once it exited.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Stdout lines joined with `\n`.
    pub stdout: String,
    /// Stderr lines joined with `\n`.
    pub stderr: String,
    /// Stdout and stderr lines interleaved in arrival order.
    pub messages: Vec<ProcessMessage>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Build the output from the ordered message list.
    pub fn from_messages(exit_code: i32, messages: Vec<ProcessMessage>) -> Self {
        let join = |error: bool| {
            messages
                .iter()
                .filter(|m| m.error == error)
                .map(|m| m.line.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self {
            exit_code,
            stdout: join(false),
            stderr: join(true),
            messages,
        }
    }
}

pub type EventListener = Box<dyn Fn(&FsEvent) + Send + Sync>;
pub type MessageListener = Box<dyn Fn(&ProcessMessage) + Send + Sync>;
pub type ExitListener = Box<dyn Fn(i32) + Send + Sync>;

/// What to run and who to tell about it.
pub struct ProcessRequest {
    pub cmd: String,
    /// Falls back to the sandbox's default working directory.
    pub cwd: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub on_stdout: Option<MessageListener>,
    pub on_stderr: Option<MessageListener>,
    pub on_exit: Option<ExitListener>,
}

impl ProcessRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: None,
            env_vars: HashMap::new(),
            on_stdout: None,
            on_stderr: None,
            on_exit: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn on_stdout(mut self, f: impl Fn(&ProcessMessage) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Box::new(f));
        self
    }

    pub fn on_stderr(mut self, f: impl Fn(&ProcessMessage) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Box::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for ProcessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRequest")
            .field("cmd", &self.cmd)
            .field("cwd", &self.cwd)
            .field("env_vars", &self.env_vars)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(line: &str, error: bool) -> ProcessMessage {
        ProcessMessage {
            line: line.to_string(),
            error,
            timestamp: 0,
        }
    }

    #[test]
    fn fs_event_from_wire_json() {
        let json = r#"{
            "path": "/home/file0.txt",
            "name": "file0.txt",
            "operation": "Create",
            "timestamp": 1700000000,
            "isDir": false
        }"#;
        let event: FsEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.operation, FsOperation::Create);
        assert_eq!(event.name, "file0.txt");
        assert!(!event.is_dir);
    }

    #[test]
    fn fs_event_unknown_operation_is_rejected() {
        let json = r#"{"path": "/a", "name": "a", "operation": "Explode"}"#;
        assert!(serde_json::from_str::<FsEvent>(json).is_err());
    }

    #[test]
    fn file_entry_uses_camel_case() {
        let entry: FileEntry = serde_json::from_str(r#"{"name":"home","isDir":true}"#).unwrap();
        assert_eq!(
            entry,
            FileEntry {
                name: "home".to_string(),
                is_dir: true
            }
        );
    }

    #[test]
    fn output_splits_streams_and_keeps_order() {
        let out = ProcessOutput::from_messages(
            0,
            vec![msg("a", false), msg("oops", true), msg("b", false)],
        );
        assert!(out.success());
        assert_eq!(out.stdout, "a\nb");
        assert_eq!(out.stderr, "oops");
        assert_eq!(out.messages.len(), 3);
        assert!(out.messages[1].error);
    }

    #[test]
    fn request_builder_collects_options() {
        let req = ProcessRequest::new("ls")
            .cwd("/tmp")
            .env("A", "1")
            .on_stdout(|_| {});
        assert_eq!(req.cwd.as_deref(), Some("/tmp"));
        assert_eq!(req.env_vars.get("A").map(String::as_str), Some("1"));
        assert!(req.on_stdout.is_some());
        assert!(req.on_exit.is_none());
        assert!(format!("{req:?}").contains("on_stdout: true"));
    }
}
