use crate::auth::SharedKeyAuth;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use skinhub_core::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone)]
pub struct AppState<S: StorageBackend> {
    pub registry: PlayerRegistry<S>,
    pub admin: SharedKeyAuth,
    pub default_skin: Option<Bytes>,
    pub counters: Arc<Counters>,
}

/// Process local counters, reset on restart.
#[derive(Debug)]
pub struct Counters {
    pub started_at: DateTime<Utc>,
    uploads_accepted: AtomicU64,
    uploads_rejected: AtomicU64,
    assets_served: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            uploads_accepted: AtomicU64::new(0),
            uploads_rejected: AtomicU64::new(0),
            assets_served: AtomicU64::new(0),
        }
    }
}

impl Counters {
    pub fn upload_accepted(&self) {
        self.uploads_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_rejected(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn asset_served(&self) {
        self.assets_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            uploads_accepted: self.uploads_accepted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            assets_served: self.assets_served.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub uploads_accepted: u64,
    pub uploads_rejected: u64,
    pub assets_served: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
}
