use async_trait::async_trait;
use sandbox::{Sandbox, SandboxConfig, SandboxError, SandboxFactory};

use crate::handle::E2bSandbox;
use crate::types::E2bConfig;

/// Creates sandboxes on an E2B-compatible service.
#[derive(Debug, Clone)]
pub struct E2bFactory {
    config: E2bConfig,
}

impl E2bFactory {
    pub fn new(config: E2bConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &E2bConfig {
        &self.config
    }
}

#[async_trait]
impl SandboxFactory for E2bFactory {
    fn name(&self) -> &str {
        "e2b"
    }

    async fn create(&self, config: SandboxConfig) -> sandbox::Result<Box<dyn Sandbox>> {
        let template = config.template.clone();
        let sandbox = E2bSandbox::create(&self.config, config)
            .await
            .map_err(|e| SandboxError::CreationFailed(format!("template {template}: {e}")))?;
        Ok(Box::new(sandbox))
    }
}
