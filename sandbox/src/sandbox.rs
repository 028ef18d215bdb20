use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EventListener, FileEntry, ProcessOutput, ProcessRequest};

/// A live handle to a remote sandbox.
///
/// Every operation requires a live handle: once [`close`](Sandbox::close) or
/// [`kill`](Sandbox::kill) returned, all operations (including those on
/// watchers and processes created from this handle) fail with
/// [`SandboxError::Closed`](crate::SandboxError::Closed).
///
/// The `Any` bound allows `SandboxFactory::destroy()` implementations to
/// downcast `Box<dyn Sandbox>` back to the concrete type.
#[async_trait]
pub trait Sandbox: Send + Sync + Any {
    // -- identity --
    fn id(&self) -> &str;
    fn template(&self) -> &str;

    // -- filesystem --
    async fn write(&self, path: &str, content: &str) -> Result<()>;
    async fn write_bytes(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn read(&self, path: &str) -> Result<String>;
    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;
    async fn make_dir(&self, path: &str) -> Result<()>;
    async fn remove(&self, path: &str) -> Result<()>;
    /// Create a watcher for `path`. Nothing is subscribed until
    /// [`Watcher::start`] is called.
    async fn watch_dir(&self, path: &str) -> Result<Box<dyn Watcher>>;
    /// Upload a file; returns the path it was stored under.
    async fn upload_file(&self, file_name: &str, content: Vec<u8>) -> Result<String>;
    async fn download_file(&self, path: &str) -> Result<Vec<u8>>;

    // -- processes --
    async fn start_process(&self, request: ProcessRequest) -> Result<Box<dyn Process>>;

    // -- lifecycle --
    /// Extend the sandbox lifetime by `duration` from now.
    async fn keep_alive(&self, duration: Duration) -> Result<()>;
    /// Close the session. The remote sandbox keeps running until it times out.
    async fn close(&mut self) -> Result<()>;
    /// Destroy the remote sandbox and close the session.
    async fn kill(&mut self) -> Result<()>;
}

/// Subscription to filesystem change events under one directory.
///
/// Listeners run one at a time, in the order events arrive.
#[async_trait]
pub trait Watcher: Send + Sync {
    fn path(&self) -> &str;
    /// Register a listener. Listeners added after `start` see later events.
    fn add_event_listener(&mut self, listener: EventListener);
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
}

/// A command running inside the sandbox.
#[async_trait]
pub trait Process: Send + Sync {
    fn id(&self) -> &str;
    async fn send_stdin(&self, data: &str) -> Result<()>;
    async fn kill(&self) -> Result<()>;
    /// Wait for the process to exit. Output listeners have seen every line
    /// by the time this returns.
    async fn wait(&mut self) -> Result<ProcessOutput>;
}
