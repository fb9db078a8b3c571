//! Registry of live codec instances and the reclamation policy applied to
//! them on demand.
//!
//! The registry is an ordinary value: the application builds one, hands it
//! to every codec it creates and decides when to call
//! [`ResourceManager::reclaim_inactive`]. Nothing here runs on a timer.

use std::{
    collections::BTreeMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use serde::Serialize;
use tokio::time::Instant;

use crate::{codec::ErrorCallback, error::CodecError, state::CodecKind};

pub const DEFAULT_INACTIVITY_WINDOW: Duration = Duration::from_millis(10_000);

/// Implemented by anything the registry may force-close.
pub trait Reclaim: Send + Sync {
    fn force_close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceHandle(u64);

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codec#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimPolicy {
    pub inactivity_window: Duration,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            inactivity_window: DEFAULT_INACTIVITY_WINDOW,
        }
    }
}

impl ReclaimPolicy {
    pub fn new(inactivity_window: Duration) -> Self {
        Self { inactivity_window }
    }

    /// An instance idle for longer than the window is always reclaimable.
    /// Among active instances only background decoders are: foreground
    /// instances and background encoders are protected.
    pub fn is_reclaimable(&self, idle: Duration, background: bool, kind: CodecKind) -> bool {
        if idle > self.inactivity_window {
            return true;
        }
        background && kind == CodecKind::Decoder
    }
}

/// Diagnostic view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReclamationRecord {
    pub handle: ResourceHandle,
    pub kind: CodecKind,
    pub idle_ms: u64,
    pub background: bool,
}

struct Entry {
    target: Weak<dyn Reclaim>,
    kind: CodecKind,
    error: ErrorCallback,
    last_activity: Instant,
    background: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: BTreeMap<ResourceHandle, Entry>,
}

#[derive(Clone, Default)]
pub struct ResourceManager {
    registry: Arc<Mutex<Registry>>,
    policy: ReclaimPolicy,
}

impl ResourceManager {
    pub fn new(policy: ReclaimPolicy) -> Self {
        Self {
            registry: Arc::default(),
            policy,
        }
    }

    pub fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The registry only keeps a weak reference, so registering never
    /// extends the instance's lifetime.
    pub fn register(
        &self,
        target: Weak<dyn Reclaim>,
        kind: CodecKind,
        error: ErrorCallback,
    ) -> ResourceHandle {
        let mut registry = self.lock();
        registry.next_id += 1;
        let handle = ResourceHandle(registry.next_id);
        registry.entries.insert(
            handle,
            Entry {
                target,
                kind,
                error,
                last_activity: Instant::now(),
                background: false,
            },
        );
        handle
    }

    pub fn unregister(&self, handle: ResourceHandle) {
        if self.lock().entries.remove(&handle).is_some() {
            log::debug!("{} unregistered", handle);
        }
    }

    pub fn record_activity(&self, handle: ResourceHandle) {
        if let Some(entry) = self.lock().entries.get_mut(&handle) {
            entry.last_activity = Instant::now();
        }
    }

    pub fn set_background(&self, handle: ResourceHandle, background: bool) {
        if let Some(entry) = self.lock().entries.get_mut(&handle) {
            entry.background = background;
        }
    }

    pub fn reclaimable(&self) -> Vec<ResourceHandle> {
        let now = Instant::now();
        self.lock()
            .entries
            .iter()
            .filter(|(_, entry)| {
                let idle = now.saturating_duration_since(entry.last_activity);
                self.policy
                    .is_reclaimable(idle, entry.background, entry.kind)
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Force-closes every reclaimable instance and returns their handles.
    ///
    /// Each instance first receives a `ResourceExhausted` error, is then
    /// closed and finally unregistered. A panic in either step is logged
    /// and the instance is unregistered anyway.
    pub fn reclaim_inactive(&self) -> Vec<ResourceHandle> {
        let now = Instant::now();
        let victims: Vec<_> = {
            let registry = self.lock();
            registry
                .entries
                .iter()
                .filter_map(|(handle, entry)| {
                    let idle = now.saturating_duration_since(entry.last_activity);
                    self.policy
                        .is_reclaimable(idle, entry.background, entry.kind)
                        .then(|| (*handle, idle, entry.target.clone(), entry.error.clone()))
                })
                .collect()
        };

        for (handle, idle, target, error) in &victims {
            log::warn!("reclaiming {} after {} ms idle", handle, idle.as_millis());
            let fault = CodecError::ResourceExhausted(format!(
                "{} reclaimed after {} ms without activity",
                handle,
                idle.as_millis()
            ));
            if std::panic::catch_unwind(AssertUnwindSafe(|| error(fault))).is_err() {
                log::error!("error callback of {} panicked during reclamation", handle);
            }
            if let Some(target) = target.upgrade() {
                if std::panic::catch_unwind(AssertUnwindSafe(|| target.force_close())).is_err() {
                    log::error!("closing {} panicked during reclamation", handle);
                }
            }
            self.unregister(*handle);
        }

        victims.into_iter().map(|(handle, ..)| handle).collect()
    }

    pub fn snapshot(&self) -> Vec<ReclamationRecord> {
        let now = Instant::now();
        self.lock()
            .entries
            .iter()
            .map(|(handle, entry)| ReclamationRecord {
                handle: *handle,
                kind: entry.kind,
                idle_ms: now.saturating_duration_since(entry.last_activity).as_millis() as u64,
                background: entry.background,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "resource_test.rs"]
mod resource_test;
