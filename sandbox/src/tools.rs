//! Function-calling tool surface over any [`Sandbox`].
//!
//! [`definitions`] describes the tools as JSON-schema functions that can be
//! handed to a language model; [`run_tool`] executes a call the model made
//! and renders the result as text.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, SandboxError};
use crate::sandbox::Sandbox;
use crate::types::ProcessRequest;

pub const MKDIR: &str = "mkdir";
pub const LS: &str = "ls";
pub const READ: &str = "read";
pub const WRITE: &str = "write";
pub const START_PROCESS: &str = "start_process";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// Arguments of any tool call. Each tool checks the fields it needs.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Params {
    path: Option<String>,
    data: Option<String>,
    cmd: Option<String>,
    cwd: Option<String>,
}

fn object_schema(properties: serde_json::Value, required: &[&str]) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: MKDIR,
            description: "Make a directory in the sandbox file system at a given path",
            parameters: object_schema(
                json!({"path": {"type": "string", "description": "The path of the directory to create"}}),
                &["path"],
            ),
        },
        ToolDefinition {
            name: LS,
            description: "List the files and directories in the sandbox file system at a given path",
            parameters: object_schema(
                json!({"path": {"type": "string", "description": "The path of the directory to list"}}),
                &["path"],
            ),
        },
        ToolDefinition {
            name: READ,
            description: "Read the contents of a file in the sandbox file system at a given path",
            parameters: object_schema(
                json!({"path": {"type": "string", "description": "The path of the file to read"}}),
                &["path"],
            ),
        },
        ToolDefinition {
            name: WRITE,
            description: "Write to a file in the sandbox file system at a given path",
            parameters: object_schema(
                json!({
                    "path": {"type": "string", "description": "The relative or absolute path of the file to write to"},
                    "data": {"type": "string", "description": "The data to write to the file"},
                }),
                &["path", "data"],
            ),
        },
        ToolDefinition {
            name: START_PROCESS,
            description: "Start a process in the sandbox and return its output",
            parameters: object_schema(
                json!({
                    "cmd": {"type": "string", "description": "The command to run to start the process"},
                    "cwd": {"type": "string", "description": "The current working directory of the process"},
                }),
                &["cmd"],
            ),
        },
    ]
}

fn required(tool: &str, name: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| {
        SandboxError::InvalidArgument(format!("missing required argument {name} for tool {tool}"))
    })
}

/// Run the tool `name` with JSON-encoded `arguments` against `sandbox`.
pub async fn run_tool(sandbox: &dyn Sandbox, name: &str, arguments: &str) -> Result<String> {
    tracing::debug!(tool = name, "running tool");
    let params: Params = serde_json::from_str(arguments).map_err(|e| {
        SandboxError::InvalidArgument(format!("arguments for tool {name} are not valid JSON: {e}"))
    })?;

    match name {
        MKDIR => {
            let path = required(name, "path", params.path)?;
            sandbox.make_dir(&path).await?;
            Ok(format!("Created directory {path}."))
        }
        LS => {
            let path = required(name, "path", params.path)?;
            let entries = sandbox.list(&path).await?;
            serde_json::to_string(&entries)
                .map_err(|e| SandboxError::InvalidArgument(format!("encode listing: {e}")))
        }
        READ => {
            let path = required(name, "path", params.path)?;
            sandbox.read(&path).await
        }
        WRITE => {
            let path = required(name, "path", params.path)?;
            let data = required(name, "data", params.data)?;
            sandbox.write(&path, &data).await?;
            Ok(format!("Successfully wrote to file {path}."))
        }
        START_PROCESS => {
            let cmd = required(name, "cmd", params.cmd)?;
            let mut request = ProcessRequest::new(cmd);
            request.cwd = params.cwd;
            let mut process = sandbox.start_process(request).await?;
            let output = process.wait().await?;
            Ok(output
                .messages
                .iter()
                .map(|m| m.line.as_str())
                .collect::<Vec<_>>()
                .join("\n"))
        }
        other => Err(SandboxError::InvalidArgument(format!("tool {other} not found"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::sandbox::{Process, Watcher};
    use crate::types::{FileEntry, ProcessMessage, ProcessOutput};

    /// In-memory stand-in: files in a map, processes echo their command.
    #[derive(Default)]
    struct StubSandbox {
        files: Mutex<BTreeMap<String, String>>,
        dirs: Mutex<Vec<String>>,
    }

    struct StubProcess {
        cmd: String,
    }

    #[async_trait]
    impl Process for StubProcess {
        fn id(&self) -> &str {
            "stub"
        }
        async fn send_stdin(&self, _data: &str) -> Result<()> {
            Ok(())
        }
        async fn kill(&self) -> Result<()> {
            Ok(())
        }
        async fn wait(&mut self) -> Result<ProcessOutput> {
            let line = self.cmd.trim_start_matches("echo ").to_string();
            Ok(ProcessOutput::from_messages(
                0,
                vec![ProcessMessage {
                    line,
                    error: false,
                    timestamp: 0,
                }],
            ))
        }
    }

    #[async_trait]
    impl Sandbox for StubSandbox {
        fn id(&self) -> &str {
            "stub"
        }
        fn template(&self) -> &str {
            "base"
        }
        async fn write(&self, path: &str, content: &str) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_string());
            Ok(())
        }
        async fn write_bytes(&self, path: &str, content: &[u8]) -> Result<()> {
            self.write(path, &String::from_utf8_lossy(content)).await
        }
        async fn read(&self, path: &str) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| SandboxError::NotFound(path.to_string()))
        }
        async fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
            self.read(path).await.map(String::into_bytes)
        }
        async fn list(&self, _path: &str) -> Result<Vec<FileEntry>> {
            let files = self.files.lock().unwrap();
            Ok(files
                .keys()
                .map(|name| FileEntry {
                    name: name.clone(),
                    is_dir: false,
                })
                .collect())
        }
        async fn make_dir(&self, path: &str) -> Result<()> {
            self.dirs.lock().unwrap().push(path.to_string());
            Ok(())
        }
        async fn remove(&self, path: &str) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
        async fn watch_dir(&self, _path: &str) -> Result<Box<dyn Watcher>> {
            Err(SandboxError::InvalidArgument("not supported".into()))
        }
        async fn upload_file(&self, file_name: &str, content: Vec<u8>) -> Result<String> {
            let path = format!("/home/user/{file_name}");
            self.write_bytes(&path, &content).await?;
            Ok(path)
        }
        async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
            self.read_bytes(path).await
        }
        async fn start_process(&self, request: ProcessRequest) -> Result<Box<dyn Process>> {
            Ok(Box::new(StubProcess { cmd: request.cmd }))
        }
        async fn keep_alive(&self, _duration: Duration) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
        async fn kill(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn definitions_cover_every_tool() {
        let names: Vec<_> = definitions().iter().map(|d| d.name).collect();
        assert_eq!(names, vec![MKDIR, LS, READ, WRITE, START_PROCESS]);
        let write = definitions().into_iter().find(|d| d.name == WRITE).unwrap();
        assert_eq!(write.parameters["required"], json!(["path", "data"]));
    }

    #[tokio::test]
    async fn write_then_read_through_tools() {
        let sb = StubSandbox::default();
        let out = run_tool(&sb, WRITE, r#"{"path": "a.txt", "data": "hello"}"#)
            .await
            .unwrap();
        assert_eq!(out, "Successfully wrote to file a.txt.");
        let out = run_tool(&sb, READ, r#"{"path": "a.txt"}"#).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn ls_renders_json_entries() {
        let sb = StubSandbox::default();
        sb.write("x", "1").await.unwrap();
        let out = run_tool(&sb, LS, r#"{"path": "/"}"#).await.unwrap();
        assert_eq!(out, r#"[{"name":"x","isDir":false}]"#);
    }

    #[tokio::test]
    async fn mkdir_and_process() {
        let sb = StubSandbox::default();
        let out = run_tool(&sb, MKDIR, r#"{"path": "d"}"#).await.unwrap();
        assert_eq!(out, "Created directory d.");
        assert_eq!(*sb.dirs.lock().unwrap(), vec!["d".to_string()]);

        let out = run_tool(&sb, START_PROCESS, r#"{"cmd": "echo hi"}"#)
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn rejects_bad_calls() {
        let sb = StubSandbox::default();
        let err = run_tool(&sb, "rm_rf", "{}").await.unwrap_err();
        assert!(err.to_string().contains("tool rm_rf not found"));

        let err = run_tool(&sb, WRITE, r#"{"path": "a"}"#).await.unwrap_err();
        assert!(err.to_string().contains("missing required argument data"));

        let err = run_tool(&sb, READ, "not json").await.unwrap_err();
        assert!(matches!(err, SandboxError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let sb = StubSandbox::default();
        let err = run_tool(&sb, READ, r#"{"path": "nope"}"#).await.unwrap_err();
        assert!(matches!(err, SandboxError::NotFound(_)));
    }
}
