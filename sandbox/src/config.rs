use std::collections::HashMap;

/// Template used when the caller does not pick one.
pub const DEFAULT_TEMPLATE: &str = "base";

/// Parameters for creating a sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Named preset defining the sandbox's initial image.
    pub template: String,
    /// Free-form labels attached to the sandbox by the service.
    pub metadata: HashMap<String, String>,
    /// Default working directory for processes that do not set one.
    pub cwd: Option<String>,
    /// Environment variables merged under every process's own variables.
    pub env_vars: HashMap<String, String>,
}

impl SandboxConfig {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            metadata: HashMap::new(),
            cwd: None,
            env_vars: HashMap::new(),
        }
    }
}
