//! Provider-agnostic interface for remote code sandboxes.
//!
//! A sandbox is a remote, ephemeral environment that exposes a filesystem,
//! directory watchers and a process API. Backends implement [`Sandbox`],
//! [`Watcher`] and [`Process`], and hand out sandboxes through a
//! [`SandboxFactory`].

mod config;
mod error;
mod factory;
mod sandbox;
pub mod tools;
mod types;

pub use config::{DEFAULT_TEMPLATE, SandboxConfig};
pub use error::{Result, SandboxError};
pub use factory::SandboxFactory;
pub use sandbox::{Process, Sandbox, Watcher};
pub use types::{
    EventListener, ExitListener, FileEntry, FsEvent, FsOperation, MessageListener, ProcessMessage,
    ProcessOutput, ProcessRequest,
};
