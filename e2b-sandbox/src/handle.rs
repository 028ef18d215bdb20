use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sandbox::{
    FileEntry, Process, ProcessRequest, Sandbox, SandboxConfig, SandboxError, Watcher,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::api::{ApiClient, FileClient};
use crate::connection::{self, Session, TaskRegistry};
use crate::process::{self, ProcessDefaults};
use crate::protocol::method;
use crate::types::{E2bConfig, Error, SandboxInfo};
use crate::watcher::E2bWatcher;

/// Longest lifetime extension the service accepts in one refresh.
pub const MAX_KEEP_ALIVE: Duration = Duration::from_secs(3600);
/// Refreshes are sent in whole seconds.
pub const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// A live E2B sandbox: the control plane client plus one JSON-RPC session.
pub struct E2bSandbox {
    info: SandboxInfo,
    template: String,
    api: ApiClient,
    files: FileClient,
    session: Session,
    tasks: TaskRegistry,
    defaults: ProcessDefaults,
    killed: bool,
}

impl E2bSandbox {
    /// Create a sandbox from `sandbox_config.template` and open its session.
    ///
    /// If the sandbox was created but the session cannot be opened, the
    /// sandbox is deleted again before the error is returned.
    pub async fn create(config: &E2bConfig, sandbox_config: SandboxConfig) -> Result<Self, Error> {
        let api = ApiClient::new(config)?;
        let info = api
            .create_sandbox(&sandbox_config.template, &sandbox_config.metadata)
            .await?;

        match Self::open(config, &info).await {
            Ok((session, files)) => {
                info!(sandbox_id = %info.sandbox_id, "session opened");
                Ok(Self {
                    template: sandbox_config.template,
                    info,
                    api,
                    files,
                    session,
                    tasks: TaskRegistry::default(),
                    defaults: ProcessDefaults {
                        cwd: sandbox_config.cwd,
                        env_vars: sandbox_config.env_vars,
                    },
                    killed: false,
                })
            }
            Err(e) => {
                warn!(sandbox_id = %info.sandbox_id, error = %e, "session failed, deleting sandbox");
                if let Err(del) = api.delete_sandbox(&info.sandbox_id).await {
                    warn!(sandbox_id = %info.sandbox_id, error = %del, "failed to delete sandbox");
                }
                Err(e)
            }
        }
    }

    async fn open(config: &E2bConfig, info: &SandboxInfo) -> Result<(Session, FileClient), Error> {
        let ws_url = match &config.ws_url {
            Some(url) => url.clone(),
            None => connection::build_ws_url(info, &config.domain)?,
        };
        let envd_url = match &config.envd_url {
            Some(url) => url.clone(),
            None => connection::build_envd_url(info, &config.domain)?,
        };
        let files = FileClient::new(&envd_url, config)?;
        let session = connection::connect(&ws_url, &config.timing).await?;
        Ok((session, files))
    }

    pub fn info(&self) -> &SandboxInfo {
        &self.info
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, Error> {
        self.session.call(method, params).await
    }

    async fn call_string(&self, method: &'static str, params: Vec<Value>) -> Result<String, Error> {
        match self.call(method, params).await? {
            Value::String(s) => Ok(s),
            other => Err(Error::UnexpectedResponse {
                method: method.to_string(),
                detail: format!("expected string, got {other}"),
            }),
        }
    }

    fn shutdown(&self) {
        self.tasks.abort_all();
        self.session.close();
    }
}

#[async_trait]
impl Sandbox for E2bSandbox {
    fn id(&self) -> &str {
        &self.info.sandbox_id
    }

    fn template(&self) -> &str {
        &self.template
    }

    async fn write(&self, path: &str, content: &str) -> sandbox::Result<()> {
        self.call(method::FILESYSTEM_WRITE, vec![json!(path), json!(content)])
            .await?;
        Ok(())
    }

    async fn write_bytes(&self, path: &str, content: &[u8]) -> sandbox::Result<()> {
        let encoded = BASE64.encode(content);
        self.call(
            method::FILESYSTEM_WRITE_BASE64,
            vec![json!(path), json!(encoded)],
        )
        .await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> sandbox::Result<String> {
        Ok(self
            .call_string(method::FILESYSTEM_READ, vec![json!(path)])
            .await?)
    }

    async fn read_bytes(&self, path: &str) -> sandbox::Result<Vec<u8>> {
        let encoded = self
            .call_string(method::FILESYSTEM_READ_BASE64, vec![json!(path)])
            .await?;
        Ok(BASE64.decode(encoded).map_err(Error::from)?)
    }

    async fn list(&self, path: &str) -> sandbox::Result<Vec<FileEntry>> {
        match self.call(method::FILESYSTEM_LIST, vec![json!(path)]).await? {
            // Empty directories come back as null.
            Value::Null => Ok(Vec::new()),
            value => Ok(serde_json::from_value(value).map_err(Error::from)?),
        }
    }

    async fn make_dir(&self, path: &str) -> sandbox::Result<()> {
        self.call(method::FILESYSTEM_MAKE_DIR, vec![json!(path)])
            .await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> sandbox::Result<()> {
        self.call(method::FILESYSTEM_REMOVE, vec![json!(path)])
            .await?;
        Ok(())
    }

    async fn watch_dir(&self, path: &str) -> sandbox::Result<Box<dyn Watcher>> {
        self.session.ensure_open()?;
        Ok(Box::new(E2bWatcher::new(
            path,
            self.session.clone(),
            self.tasks.clone(),
        )))
    }

    async fn upload_file(&self, file_name: &str, content: Vec<u8>) -> sandbox::Result<String> {
        self.session.ensure_open()?;
        Ok(self.files.upload(file_name, content).await?)
    }

    async fn download_file(&self, path: &str) -> sandbox::Result<Vec<u8>> {
        self.session.ensure_open()?;
        Ok(self.files.download(path).await?)
    }

    async fn start_process(&self, request: ProcessRequest) -> sandbox::Result<Box<dyn Process>> {
        let process =
            process::start(&self.session, &self.tasks, &self.defaults, request).await?;
        Ok(Box::new(process))
    }

    async fn keep_alive(&self, duration: Duration) -> sandbox::Result<()> {
        self.session.ensure_open()?;
        if duration > MAX_KEEP_ALIVE {
            return Err(SandboxError::InvalidArgument(format!(
                "keep-alive of {}s exceeds the maximum of {}s",
                duration.as_secs(),
                MAX_KEEP_ALIVE.as_secs()
            )));
        }
        if duration < MIN_KEEP_ALIVE {
            return Err(SandboxError::InvalidArgument(format!(
                "keep-alive of {}ms is shorter than {}s",
                duration.as_millis(),
                MIN_KEEP_ALIVE.as_secs()
            )));
        }
        Ok(self
            .api
            .refresh_sandbox(&self.info.sandbox_id, duration)
            .await?)
    }

    async fn close(&mut self) -> sandbox::Result<()> {
        if !self.session.is_closed() {
            info!(sandbox_id = %self.info.sandbox_id, "closing sandbox session");
        }
        self.shutdown();
        Ok(())
    }

    /// Delete the sandbox. The control plane does not need the session, so
    /// this also works after `close`.
    async fn kill(&mut self) -> sandbox::Result<()> {
        if self.killed {
            return Err(SandboxError::Closed);
        }
        let result = self.api.delete_sandbox(&self.info.sandbox_id).await;
        self.shutdown();
        result?;
        self.killed = true;
        info!(sandbox_id = %self.info.sandbox_id, "sandbox killed");
        Ok(())
    }
}

impl Drop for E2bSandbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}
