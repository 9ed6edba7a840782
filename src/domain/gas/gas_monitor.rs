//! Periodic gas price tracking with a latest-value broadcast

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::GasPriceSnapshot;
use crate::infrastructure::chain::ChainExecutor;
use crate::shared::errors::ChainError;
use crate::shared::types::ChainId;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Polls the connected chain's fee data and keeps the latest snapshot per chain
pub struct GasPriceMonitor {
    chain: Arc<dyn ChainExecutor>,
    poll_interval: Duration,
    snapshots: watch::Sender<HashMap<ChainId, GasPriceSnapshot>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl GasPriceMonitor {
    pub fn new(chain: Arc<dyn ChainExecutor>, poll_interval: Duration) -> Self {
        let (snapshots, _) = watch::channel(HashMap::new());
        Self {
            chain,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            snapshots,
            task: Mutex::new(None),
        }
    }

    /// Fetch fee data once and publish the derived snapshot
    pub async fn poll_once(&self) -> Result<GasPriceSnapshot, ChainError> {
        let chain_id = self.chain.get_network().await?;
        let base_fee = self.chain.get_fee_data().await?;
        let snapshot = GasPriceSnapshot::from_base_fee(chain_id, base_fee, Utc::now());

        debug!(chain_id, standard = %snapshot.standard, "gas price updated");
        self.snapshots.send_modify(|all| {
            all.insert(chain_id, snapshot.clone());
        });
        Ok(snapshot)
    }

    pub fn latest(&self, chain_id: ChainId) -> Option<GasPriceSnapshot> {
        self.snapshots.borrow().get(&chain_id).cloned()
    }

    pub fn snapshots(&self) -> HashMap<ChainId, GasPriceSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashMap<ChainId, GasPriceSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Spawn the polling loop. The first poll happens immediately. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = match self.task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let monitor = Arc::clone(self);
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(monitor.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.poll_once().await {
                            warn!(error = %e, "gas price poll failed");
                        }
                    }
                }
            }
            debug!("gas monitor loop exited");
        });

        info!(interval = ?self.poll_interval, "gas monitor started");
        *task = Some((token, handle));
    }

    /// Stop the polling loop and wait for it to exit
    pub async fn stop(&self) {
        let running = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some((token, handle)) = running {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "gas monitor task ended abnormally");
            }
            info!("gas monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(task) => task.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}
