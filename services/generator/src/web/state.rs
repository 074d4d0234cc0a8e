//! services/generator/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::orchestrator::{AutoRetryHandle, AutoRetryScheduler, AutoRetryState, GenerationService};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub service: GenerationService,
    pub scheduler: AutoRetryScheduler,
    /// Client-reported connectivity, observed by every auto-retry watcher.
    pub connectivity: watch::Sender<bool>,
    watchers: Mutex<HashMap<Uuid, AutoRetryHandle>>,
}

impl AppState {
    pub fn new(service: GenerationService, scheduler: AutoRetryScheduler, connectivity: watch::Sender<bool>) -> Self {
        Self {
            service,
            scheduler,
            connectivity,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<Uuid, AutoRetryHandle>> {
        self.watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts an auto-retry watcher for the series unless a live one exists.
    pub fn ensure_watcher(&self, series_id: Uuid, requested_total: Option<u32>) -> AutoRetryState {
        let mut watchers = self.watchers();
        if let Some(handle) = watchers.get(&series_id) {
            let state = handle.state();
            if !state.is_finished() {
                return state;
            }
        }
        info!(series_id = %series_id, "Starting auto-retry watcher");
        let handle = self.scheduler.watch(series_id, requested_total);
        let state = handle.state();
        watchers.insert(series_id, handle);
        state
    }

    /// Manual retry: nudges a live watcher, or starts a fresh one.
    pub fn retry(&self, series_id: Uuid, requested_total: Option<u32>) -> AutoRetryState {
        {
            let watchers = self.watchers();
            if let Some(handle) = watchers.get(&series_id) {
                let state = handle.state();
                if !state.is_finished() {
                    handle.retry_now();
                    return state;
                }
            }
        }
        self.ensure_watcher(series_id, requested_total)
    }

    pub fn watcher_state(&self, series_id: Uuid) -> Option<AutoRetryState> {
        self.watchers().get(&series_id).map(AutoRetryHandle::state)
    }

    /// Records client-reported connectivity. Only a real change wakes watchers.
    pub fn set_online(&self, online: bool) {
        self.connectivity.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}
