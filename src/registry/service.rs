//! registry::service
//!
//! Process-lifetime ownership of a [`SiteRegistry`].
//!
//! `RegistryService` starts the periodic recalculating save and performs
//! the final save on shutdown. Callers receive the registry through
//! [`RegistryService::registry`] instead of reaching for a global.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{RegistryError, SaveOutcome, SiteRegistry};

/// Owns a registry and its periodic save task.
pub struct RegistryService {
    registry: Arc<SiteRegistry>,
    timer: Option<JoinHandle<()>>,
}

impl RegistryService {
    /// Start the service. Must be called from within a Tokio runtime.
    pub fn start(registry: Arc<SiteRegistry>, save_interval: Duration) -> Self {
        let timer = spawn_save_timer(Arc::downgrade(&registry), save_interval);
        debug!(interval_secs = save_interval.as_secs(), "registry service started");
        Self {
            registry,
            timer: Some(timer),
        }
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    /// Stop the periodic save and run one final recalculating save.
    pub async fn shutdown(mut self) -> Result<SaveOutcome, RegistryError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let outcome = self.registry.save(true).await;
        match &outcome {
            Ok(SaveOutcome::Saved { sites }) => info!(sites, "saved sites on shutdown"),
            Ok(skipped) => debug!(outcome = ?skipped, "nothing saved on shutdown"),
            Err(e) => warn!(error = %e, "final save failed"),
        }
        outcome
    }
}

impl Drop for RegistryService {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Save with size recalculation every `period`, starting one period from
/// now, for as long as the registry is alive.
fn spawn_save_timer(registry: Weak<SiteRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            if let Err(e) = registry.save(true).await {
                warn!(error = %e, "periodic save failed");
            }
        }
    })
}
