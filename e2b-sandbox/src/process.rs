use std::collections::HashMap;

use async_trait::async_trait;
use sandbox::{
    ExitListener, MessageListener, Process, ProcessMessage, ProcessOutput, ProcessRequest,
    SandboxError,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{Notification, Session, TaskRegistry};
use crate::protocol::{self, OutputEvent, method, subscription};
use crate::types::Error;

const PROCESS_ID_LEN: usize = 12;

/// Sandbox-wide process settings applied under each request's own.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessDefaults {
    pub cwd: Option<String>,
    pub env_vars: HashMap<String, String>,
}

impl ProcessDefaults {
    fn cwd(&self, requested: Option<String>) -> String {
        requested.or_else(|| self.cwd.clone()).unwrap_or_default()
    }

    fn env(&self, overrides: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = self.env_vars.clone();
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

fn new_process_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(PROCESS_ID_LEN)
        .collect()
}

/// A remote process. Output is collected by a delivery task that runs until
/// the exit notification arrives.
pub(crate) struct E2bProcess {
    id: String,
    session: Session,
    task: Option<JoinHandle<Result<ProcessOutput, Error>>>,
    output: Option<ProcessOutput>,
}

/// Subscribe to exit and output, then start `request` as a new process.
pub(crate) async fn start(
    session: &Session,
    tasks: &TaskRegistry,
    defaults: &ProcessDefaults,
    request: ProcessRequest,
) -> Result<E2bProcess, Error> {
    session.ensure_open()?;
    let pid = new_process_id();
    let (tx, rx) = session.reliable_route();

    let mut subscriptions: Vec<String> = Vec::with_capacity(3);
    for kind in [
        subscription::ON_EXIT,
        subscription::ON_STDOUT,
        subscription::ON_STDERR,
    ] {
        let result = session
            .subscribe(
                method::PROCESS_SUBSCRIBE,
                vec![json!(kind), json!(pid)],
                tx.clone(),
            )
            .await;
        match result {
            Ok(sid) => subscriptions.push(sid),
            Err(e) => {
                release(session, subscriptions).await;
                return Err(e);
            }
        }
    }
    drop(tx);

    let Some(exit_sid) = subscriptions.first().cloned() else {
        return Err(Error::Closed);
    };
    let stderr_sid = subscriptions.get(2).cloned().unwrap_or_default();
    let ProcessRequest {
        cmd,
        cwd,
        env_vars,
        on_stdout,
        on_stderr,
        on_exit,
    } = request;

    let delivery = Delivery {
        pid: pid.clone(),
        exit_sid,
        stderr_sid,
        subscriptions: subscriptions.clone(),
        session: session.clone(),
        on_stdout,
        on_stderr,
        on_exit,
        messages: Vec::new(),
    };
    let task = tokio::spawn(delivery.run(rx));
    tasks.register(task.abort_handle());

    let env = defaults.env(&env_vars);
    let cwd = defaults.cwd(cwd);
    tracing::debug!(pid = %pid, cmd = %cmd, cwd = %cwd, "starting process");
    let started = session
        .call(
            method::PROCESS_START,
            vec![json!(pid), json!(cmd), json!(env), json!(cwd)],
        )
        .await;
    if let Err(e) = started {
        task.abort();
        release(session, subscriptions).await;
        return Err(e);
    }

    Ok(E2bProcess {
        id: pid,
        session: session.clone(),
        task: Some(task),
        output: None,
    })
}

/// Drop process subscriptions, ignoring failures.
async fn release(session: &Session, subscriptions: Vec<String>) {
    for sid in subscriptions {
        if let Err(e) = session.unsubscribe(method::PROCESS_UNSUBSCRIBE, sid).await {
            tracing::debug!("process unsubscribe failed: {e}");
        }
    }
}

struct Delivery {
    pid: String,
    exit_sid: String,
    stderr_sid: String,
    subscriptions: Vec<String>,
    session: Session,
    on_stdout: Option<MessageListener>,
    on_stderr: Option<MessageListener>,
    on_exit: Option<ExitListener>,
    messages: Vec<ProcessMessage>,
}

impl Delivery {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Notification>,
    ) -> Result<ProcessOutput, Error> {
        let exit_code = loop {
            let Some(n) = rx.recv().await else {
                tracing::warn!(pid = %self.pid, "session closed before process exited");
                return Err(Error::Closed);
            };
            if n.subscription == self.exit_sid {
                break self.exit_code(&n.result);
            }
            self.output(n);
        };

        // Output that arrived before the exit notification is already queued.
        while let Ok(n) = rx.try_recv() {
            if n.subscription != self.exit_sid {
                self.output(n);
            }
        }
        drop(rx);
        release(&self.session, std::mem::take(&mut self.subscriptions)).await;

        tracing::debug!(pid = %self.pid, exit_code, "process exited");
        if let Some(on_exit) = &self.on_exit {
            on_exit(exit_code);
        }
        Ok(ProcessOutput::from_messages(exit_code, self.messages))
    }

    fn exit_code(&self, result: &Value) -> i32 {
        protocol::parse_exit_code(result).unwrap_or_else(|| {
            tracing::warn!(pid = %self.pid, %result, "exit notification without a code");
            -1
        })
    }

    fn output(&mut self, n: Notification) {
        let event: OutputEvent = match serde_json::from_value(n.result) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(pid = %self.pid, "malformed process output: {e}");
                return;
            }
        };
        let message = ProcessMessage {
            error: n.subscription == self.stderr_sid || event.is_stderr(),
            line: event.line,
            timestamp: event.timestamp,
        };
        let listener = if message.error {
            &self.on_stderr
        } else {
            &self.on_stdout
        };
        if let Some(listener) = listener {
            listener(&message);
        }
        self.messages.push(message);
    }
}

#[async_trait]
impl Process for E2bProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_stdin(&self, data: &str) -> sandbox::Result<()> {
        self.session
            .call(method::PROCESS_WRITE_STDIN, vec![json!(self.id), json!(data)])
            .await?;
        Ok(())
    }

    async fn kill(&self) -> sandbox::Result<()> {
        self.session
            .call(method::PROCESS_KILL, vec![json!(self.id)])
            .await?;
        tracing::info!(pid = %self.id, "process killed");
        Ok(())
    }

    async fn wait(&mut self) -> sandbox::Result<ProcessOutput> {
        self.session.ensure_open()?;
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        let Some(task) = self.task.take() else {
            return Err(SandboxError::Closed);
        };
        let output = match task.await {
            Ok(result) => result?,
            Err(e) if e.is_cancelled() => return Err(SandboxError::Closed),
            Err(e) => {
                return Err(SandboxError::Connection(format!(
                    "process {} delivery failed: {e}",
                    self.id
                )));
            }
        };
        self.output = Some(output.clone());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_ids_are_short_and_alphanumeric() {
        let id = new_process_id();
        assert_eq!(id.len(), PROCESS_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_process_id());
    }

    #[test]
    fn defaults_fill_in_missing_settings() {
        let defaults = ProcessDefaults {
            cwd: Some("/home/user".to_string()),
            env_vars: HashMap::from([
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string()),
            ]),
        };
        assert_eq!(defaults.cwd(None), "/home/user");
        assert_eq!(defaults.cwd(Some("/tmp".to_string())), "/tmp");
        assert_eq!(ProcessDefaults::default().cwd(None), "");

        let env = defaults.env(&HashMap::from([("B".to_string(), "3".to_string())]));
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("B").map(String::as_str), Some("3"));
    }
}
