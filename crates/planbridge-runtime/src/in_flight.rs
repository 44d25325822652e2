//! Registry of publishes that have started but not yet settled.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::lock_or_recover;

#[derive(Debug)]
/// Alias set with a wait-for-empty primitive.
pub struct InFlightRegistry {
    aliases: Mutex<HashSet<String>>,
    count: watch::Sender<usize>,
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        let (count, _rx) = watch::channel(0);
        Self {
            aliases: Mutex::new(HashSet::new()),
            count,
        }
    }
}

impl InFlightRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `alias`. `None` when the alias is already in flight.
    pub fn track(self: &Arc<Self>, alias: &str) -> Option<InFlightGuard> {
        let mut aliases = lock_or_recover(&self.aliases);
        if !aliases.insert(alias.to_string()) {
            return None;
        }
        let len = aliases.len();
        self.count.send_replace(len);
        Some(InFlightGuard {
            registry: Arc::clone(self),
            alias: alias.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.aliases).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, alias: &str) -> bool {
        lock_or_recover(&self.aliases).contains(alias)
    }

    /// Resolve once no publish is in flight.
    pub async fn wait_drained(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    fn release(&self, alias: &str) {
        let mut aliases = lock_or_recover(&self.aliases);
        if aliases.remove(alias) {
            let len = aliases.len();
            self.count.send_replace(len);
        }
    }
}

#[derive(Debug)]
/// Removes its alias from the registry when dropped, on success or failure.
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    alias: String,
}

impl InFlightGuard {
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.alias);
    }
}
