// src/instance/readiness.rs

//! Replication-readiness predicate.
//!
//! Queried during replica bring-up, once per poll interval, until it reports
//! ready. Injectable so tests can script the verdicts.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

use super::control::ControlChannel;

/// How the readiness predicate is polled during replica bring-up.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// Delay between checks.
    pub interval: Duration,
    /// Checks before the bring-up is declared stalled.
    pub max_checks: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_checks: 600,
        }
    }
}

/// Decides whether a replica has caught up enough to be marked running.
#[async_trait]
pub trait ReadinessChecker: Send + Sync {
    async fn is_synced(&self, control: &dyn ControlChannel) -> Result<bool>;
}

/// Baseline stub: always reports ready.
#[derive(Debug, Default)]
pub struct AlwaysReady;

#[async_trait]
impl ReadinessChecker for AlwaysReady {
    async fn is_synced(&self, _control: &dyn ControlChannel) -> Result<bool> {
        Ok(true)
    }
}

/// Real probe: asks the instance for its replication INFO section and looks
/// for an established link to the upstream.
#[derive(Debug, Default)]
pub struct LinkStatusReady;

#[async_trait]
impl ReadinessChecker for LinkStatusReady {
    async fn is_synced(&self, control: &dyn ControlChannel) -> Result<bool> {
        let body = control.info("replication").await?;
        Ok(body
            .lines()
            .any(|line| line.trim() == "master_link_status:up"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubControl {
        replication_body: String,
    }

    #[async_trait]
    impl ControlChannel for StubControl {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn info(&self, _section: &str) -> Result<String> {
            Ok(self.replication_body.clone())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        async fn promote(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn always_ready_reports_true() {
        let control = StubControl {
            replication_body: String::new(),
        };
        assert!(AlwaysReady.is_synced(&control).await.unwrap());
    }

    #[tokio::test]
    async fn link_status_follows_the_replication_section() {
        let up = StubControl {
            replication_body:
                "# Replication\r\nrole:slave\r\nmaster_link_status:up\r\n".to_string(),
        };
        assert!(LinkStatusReady.is_synced(&up).await.unwrap());

        let down = StubControl {
            replication_body:
                "# Replication\r\nrole:slave\r\nmaster_link_status:down\r\n".to_string(),
        };
        assert!(!LinkStatusReady.is_synced(&down).await.unwrap());
    }
}
