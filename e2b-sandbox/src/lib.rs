//! Client for E2B-style remote sandboxes.
//!
//! Implements the [`sandbox::Sandbox`] interface on top of the service's two
//! planes: a REST control plane that creates, refreshes and deletes
//! sandboxes, and a JSON-RPC 2.0 session over WebSocket for filesystem,
//! directory watch and process operations.
//!
//! # Features
//! - One background task per session owns the WebSocket and correlates
//!   responses with requests
//! - Subscription notifications routed to watchers and processes in wire order
//! - Watchers and processes stop when their sandbox handle is closed
//! - Multipart file upload and download
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), sandbox::SandboxError> {
//! use e2b_sandbox::{E2bConfig, E2bFactory};
//! use sandbox::{ProcessRequest, SandboxConfig, SandboxFactory};
//!
//! let factory = E2bFactory::new(E2bConfig::new("e2b_..."));
//! let mut sb = factory.create(SandboxConfig::new("base")).await?;
//!
//! sb.write("/home/user/hello.txt", "hi").await?;
//! let mut process = sb
//!     .start_process(ProcessRequest::new("cat /home/user/hello.txt"))
//!     .await?;
//! let output = process.wait().await?;
//! println!("{}", output.stdout);
//!
//! sb.close().await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod connection;
mod factory;
mod handle;
mod process;
pub mod protocol;
mod types;
mod watcher;

pub use factory::E2bFactory;
pub use handle::{E2bSandbox, MAX_KEEP_ALIVE, MIN_KEEP_ALIVE};
pub use types::{E2bConfig, Error, SandboxInfo, TimingConfig};
