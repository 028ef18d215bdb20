use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sandbox::{EventListener, FsEvent, Watcher};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{Notification, Session, TaskRegistry};
use crate::protocol::{method, subscription};

type Listeners = Arc<Mutex<Vec<EventListener>>>;

/// Directory watcher backed by a `watchDir` subscription.
pub(crate) struct E2bWatcher {
    path: String,
    session: Session,
    tasks: TaskRegistry,
    listeners: Listeners,
    subscription: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl E2bWatcher {
    pub fn new(path: &str, session: Session, tasks: TaskRegistry) -> Self {
        Self {
            path: path.to_string(),
            session,
            tasks,
            listeners: Arc::default(),
            subscription: None,
            task: None,
        }
    }
}

#[async_trait]
impl Watcher for E2bWatcher {
    fn path(&self) -> &str {
        &self.path
    }

    fn add_event_listener(&mut self, listener: EventListener) {
        match self.listeners.lock() {
            Ok(mut l) => l.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    async fn start(&mut self) -> sandbox::Result<()> {
        self.session.ensure_open()?;
        if self.subscription.is_some() {
            return Ok(());
        }

        let (tx, rx) = self.session.lossy_route();
        let sid = self
            .session
            .subscribe(
                method::FILESYSTEM_SUBSCRIBE,
                vec![json!(subscription::WATCH_DIR), json!(self.path)],
                tx,
            )
            .await?;
        tracing::info!(path = %self.path, subscription = %sid, "watcher started");

        let task = tokio::spawn(deliver(
            self.path.clone(),
            rx,
            Arc::clone(&self.listeners),
        ));
        self.tasks.register(task.abort_handle());
        self.task = Some(task);
        self.subscription = Some(sid);
        Ok(())
    }

    async fn stop(&mut self) -> sandbox::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let Some(sid) = self.subscription.take() else {
            return Ok(());
        };
        self.session
            .unsubscribe(method::FILESYSTEM_UNSUBSCRIBE, sid)
            .await?;
        tracing::info!(path = %self.path, "watcher stopped");
        Ok(())
    }
}

impl Drop for E2bWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn deliver(path: String, mut rx: mpsc::Receiver<Notification>, listeners: Listeners) {
    while let Some(n) = rx.recv().await {
        let event: FsEvent = match serde_json::from_value(n.result) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(path = %path, "malformed watch event: {e}");
                continue;
            }
        };
        tracing::debug!(path = %event.path, operation = %event.operation, "fs event");
        let guard = match listeners.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in guard.iter() {
            listener(&event);
        }
    }
    // The route only closes when the session goes away.
    tracing::warn!(path = %path, "watch ended: session closed");
}
