use async_trait::async_trait;

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::sandbox::Sandbox;

#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Human-readable name for this factory implementation (e.g. "e2b").
    fn name(&self) -> &str;
    /// Create a new sandbox from the given template and defaults.
    async fn create(&self, config: SandboxConfig) -> Result<Box<dyn Sandbox>>;
    /// Tear down a sandbox for good. Errors are logged, not returned: the
    /// handle is unusable afterwards either way.
    async fn destroy(&self, mut sandbox: Box<dyn Sandbox>) {
        let id = sandbox.id().to_string();
        if let Err(e) = sandbox.kill().await {
            tracing::warn!(sandbox_id = %id, error = %e, "failed to kill sandbox");
        }
    }
}
