//! Single-poll coordinator for all appliances of one DuerOS account.
//!
//! The coordinator owns the only authoritative copy of the appliance data. Every successful
//! refresh replaces the whole [`Snapshot`] in one step and signals subscribers through a
//! `watch` channel, so readers always see either the previous or the new complete mapping.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client::DuerosClient;
use super::error::DuerosError;
use super::model::Appliance;
use super::model::Status;

/// Default polling interval of the appliance list
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Unique ID -> appliance, as of one poll
pub type Snapshot = HashMap<String, Appliance>;

/// Build a snapshot from a device list. Later duplicates of a unique ID win.
pub fn build_snapshot(appliances: Vec<Appliance>) -> Snapshot {
    appliances
        .into_iter()
        .map(|appliance| (appliance.unique_id(), appliance))
        .collect()
}

pub struct Coordinator<C: DuerosClient> {
    client: C,
    update_interval: Duration,

    /// Latest published snapshot
    snapshot: watch::Sender<Arc<Snapshot>>,

    /// Serializes refreshes and holds the outcome of the latest one
    refresh_lock: Mutex<Result<(), DuerosError>>,

    /// Number of refreshes that have finished (successfully or not)
    completed_refreshes: AtomicU64,

    /// Set by `request_refresh`, cleared when the request is served
    refresh_pending: AtomicBool,
    refresh_requested: Notify,
}

impl<C: DuerosClient> Coordinator<C> {
    pub fn new(client: C, update_interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::new()));
        Self {
            client,
            update_interval,
            snapshot,
            refresh_lock: Mutex::new(Ok(())),
            completed_refreshes: AtomicU64::new(0),
            refresh_pending: AtomicBool::new(false),
            refresh_requested: Notify::new(),
        }
    }

    /// Client used for appliance commands
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver signalled every time a new snapshot is published
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.subscribe()
    }

    /// Fetch the appliance list and publish it as the new snapshot.
    ///
    /// At most one fetch is in flight: a call made while another refresh is running waits for
    /// it and returns its outcome instead of issuing a second request.
    pub async fn refresh(&self) -> Result<(), DuerosError> {
        let observed = self.completed_refreshes.load(Ordering::Acquire);
        let mut last = self.refresh_lock.lock().await;
        if self.completed_refreshes.load(Ordering::Acquire) != observed {
            debug!("Joined an in-flight refresh");
            return last.clone();
        }

        let result = self.fetch().await.map(|snapshot| {
            debug!(appliances = snapshot.len(), "Publishing new snapshot");
            self.snapshot.send_replace(Arc::new(snapshot));
        });
        *last = result.clone();
        self.completed_refreshes.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn fetch(&self) -> Result<Snapshot, DuerosError> {
        let rsp = self.client.get_device_list().await.map_err(|e| {
            error!("Failed to fetch appliance list: {}", e);
            DuerosError::UpdateFailed(e.to_string())
        })?;

        match rsp.status {
            Status::Ok => Ok(build_snapshot(rsp.appliances)),
            Status::NotLogin => {
                error!("{}", rsp.msg);
                Err(DuerosError::AuthFailed(rsp.msg))
            }
            Status::Other(code) => {
                error!(code, "{}", rsp.msg);
                Err(DuerosError::UpdateFailed(rsp.msg))
            }
        }
    }

    /// Ask for a refresh without waiting for it. Requests made before the pending one is
    /// served are coalesced into a single fetch.
    pub fn request_refresh(&self) {
        if !self.refresh_pending.swap(true, Ordering::AcqRel) {
            self.refresh_requested.notify_one();
        }
    }

    /// Whether a requested refresh has not been served yet
    #[cfg(test)]
    pub fn refresh_requested(&self) -> bool {
        self.refresh_pending.load(Ordering::Acquire)
    }

    /// Serve a pending refresh request, if any
    pub async fn refresh_if_requested(&self) -> Option<Result<(), DuerosError>> {
        if !self.refresh_pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(self.refresh().await)
    }

    /// Scheduling loop: refresh every `update_interval` and whenever a refresh is requested.
    ///
    /// Returns once the remote rejects the session.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.update_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        info!(
            "Polling DuerOS every {}s",
            self.update_interval.as_secs()
        );

        loop {
            let result = tokio::select! {
                _ = interval.tick() => Some(self.refresh().await),
                _ = self.refresh_requested.notified() => {
                    let result = self.refresh_if_requested().await;
                    interval.reset();
                    result
                }
            };

            if let Some(Err(e)) = result {
                if e.is_auth_failure() {
                    error!("DuerOS session rejected, re-authentication required; polling stopped");
                    return;
                }
                warn!("Scheduled refresh failed: {}", e);
            }
        }
    }
}
