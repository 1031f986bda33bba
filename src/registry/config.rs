//! Relay registry configuration

use std::time::Duration;

/// Configuration for the relay core
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Bound wait for a device reply to a forwarded action; after this the
    /// client receives a timeout error and the correlation entry is dropped
    pub action_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set the action reply timeout
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }
}
