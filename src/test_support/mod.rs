//! Shared helpers for container-backed integration tests.

pub mod postgres;
pub mod runtime;

use uuid::Uuid;

/// A uniquely named container network so parallel test runs never collide.
#[derive(Debug, Clone)]
pub struct TestNetwork {
    name: String,
}

impl TestNetwork {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            name: unique_name(prefix),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
