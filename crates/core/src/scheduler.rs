//! Interval triggers for the pipeline phases.
//!
//! Each configured interval runs in its own background task; overlapping
//! fires are coalesced by the per-phase latches inside the crawler and
//! stats services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::{SchedulerConfig, WorkersConfig};
use crate::facade::DataFacade;

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Discovery,
    Parsing,
    Full,
}

pub struct Scheduler {
    config: SchedulerConfig,
    workers: WorkersConfig,
    facade: Arc<DataFacade>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, workers: WorkersConfig, facade: Arc<DataFacade>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            workers,
            facade,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Spawn one loop per enabled interval.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }

        self.spawn_trigger(Trigger::Discovery, self.config.discovery_interval_secs);
        self.spawn_trigger(Trigger::Parsing, self.config.parsing_interval_secs);
        self.spawn_trigger(Trigger::Full, self.config.full_interval_secs);
        info!("scheduler started");
    }

    /// Stop all loops.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        info!("scheduler stopped");
    }

    fn spawn_trigger(&self, trigger: Trigger, interval_secs: u64) {
        if interval_secs == 0 {
            return;
        }
        let facade = self.facade.clone();
        let workers = self.workers.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(?trigger, interval_secs, "pipeline trigger started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(?trigger, "pipeline trigger stopped");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {
                        match trigger {
                            Trigger::Discovery => facade.discover_servers(workers.discovery).await,
                            Trigger::Parsing => facade.parse_rooms(workers.parsing).await,
                            Trigger::Full => facade.full(workers.discovery, workers.parsing).await,
                        }
                    }
                }
            }
        });
    }
}
