//! # Scheduler
//!
//! Process-wide service owning one logical timer and one serialization
//! token per `(sync kind, user | ∅)`.
//!
//! ## Tick Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Scheduler Tick                                  │
//! │                                                                         │
//! │  sleep(interval of the kind)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  re-read sync_settings row ── disabled? ──▶ skip this tick              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  shared kind: one slot (kind, ∅)                                        │
//! │  per-tenant kind: re-read whitelisted users, one slot per user          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  try-acquire slot token ── already held? ──▶ skip (drop, never queue)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  spawn pipeline with a fresh StopToken                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  on completion: release token, record last run in memory                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pipeline failure is never fatal to the scheduler; a settings-read
//! failure degrades that kind to disabled for the tick and logs. Shutdown
//! trips every active token and awaits all running pipelines.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fresis_core::{SyncKind, SyncReport, SyncSetting};

use crate::cancel::StopToken;
use crate::pipeline::{
    sync_customers, sync_ddt, sync_invoices, sync_orders, sync_prices, sync_products, SyncDeps,
};
use crate::progress::ProgressSender;
use crate::snapshot::{
    CustomerRecord, DdtRecord, InvoiceRecord, JsonSnapshotParser, OrderRecord, PriceRecord,
    ProductRecord, SnapshotParser, SnapshotSource,
};
use crate::store::SyncStore;

// =============================================================================
// Errors
// =============================================================================

/// Errors of the imperative scheduler surface.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The `(kind, user|∅)` token is already held; the request is
    /// rejected, never queued.
    #[error("{kind} sync already in flight")]
    Busy {
        kind: SyncKind,
        user_id: Option<String>,
    },

    /// A per-tenant kind was invoked without a user.
    #[error("{0} sync requires a user id")]
    UserRequired(SyncKind),

    /// The settings or maintenance statement failed.
    #[error(transparent)]
    Store(#[from] fresis_db::DbError),
}

// =============================================================================
// Slots and Run Records
// =============================================================================

/// The serialization unit: one sync kind, scoped to a tenant for the
/// per-user kinds.
pub type Slot = (SyncKind, Option<String>);

/// Outcome of the most recent run of one slot, kept in memory only.
#[derive(Debug, Clone)]
pub struct LastRun {
    pub finished_at: i64,
    pub report: SyncReport,
}

struct RunningSync {
    stop: Arc<StopToken>,
    handle: Option<JoinHandle<()>>,
}

// =============================================================================
// Parser Bundle
// =============================================================================

/// The six parsers, one per snapshot record type.
#[derive(Clone)]
pub struct SnapshotParsers {
    pub customers: Arc<dyn SnapshotParser<CustomerRecord>>,
    pub orders: Arc<dyn SnapshotParser<OrderRecord>>,
    pub products: Arc<dyn SnapshotParser<ProductRecord>>,
    pub prices: Arc<dyn SnapshotParser<PriceRecord>>,
    pub ddt: Arc<dyn SnapshotParser<DdtRecord>>,
    pub invoices: Arc<dyn SnapshotParser<InvoiceRecord>>,
}

impl SnapshotParsers {
    /// The default bundle: every snapshot is one JSON array of records.
    pub fn json() -> Self {
        SnapshotParsers {
            customers: Arc::new(JsonSnapshotParser::new()),
            orders: Arc::new(JsonSnapshotParser::new()),
            products: Arc::new(JsonSnapshotParser::new()),
            prices: Arc::new(JsonSnapshotParser::new()),
            ddt: Arc::new(JsonSnapshotParser::new()),
            invoices: Arc::new(JsonSnapshotParser::new()),
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// The sync scheduler. One instance per process.
pub struct Scheduler<S: SyncStore> {
    inner: Arc<Inner<S>>,
    shutdown_tx: watch::Sender<bool>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner<S> {
    store: Arc<S>,
    source: Arc<dyn SnapshotSource>,
    parsers: SnapshotParsers,
    slots: Mutex<HashMap<Slot, RunningSync>>,
    last_runs: Mutex<HashMap<Slot, LastRun>>,
}

impl<S: SyncStore> Scheduler<S> {
    pub fn new(store: Arc<S>, source: Arc<dyn SnapshotSource>, parsers: SnapshotParsers) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Scheduler {
            inner: Arc::new(Inner {
                store,
                source,
                parsers,
                slots: Mutex::new(HashMap::new()),
                last_runs: Mutex::new(HashMap::new()),
            }),
            shutdown_tx,
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Seeds missing settings, then installs one timer task per kind.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.inner.store.seed_default_settings().await?;

        let settings = self.inner.store.all_settings().await?;
        for setting in &settings {
            info!(
                kind = %setting.sync_type,
                interval_minutes = setting.interval_minutes,
                enabled = setting.enabled,
                "Sync timer installed"
            );
        }

        let mut timers = lock(&self.timers);
        for kind in SyncKind::ALL {
            let inner = self.inner.clone();
            let shutdown = self.shutdown_tx.subscribe();
            timers.push(tokio::spawn(timer_loop(inner, kind, shutdown)));
        }

        info!("Scheduler started");
        Ok(())
    }

    /// One-shot invocation bypassing the interval and enable gates but
    /// still respecting the slot token: a request arriving while the
    /// periodic run holds the token is rejected, not queued.
    pub async fn run_manual_full_sync(
        &self,
        kind: SyncKind,
        user_id: Option<String>,
    ) -> Result<SyncReport, SchedulerError> {
        let user = normalize_user(kind, user_id)?;
        let stop = self.inner.try_begin(kind, user.clone())?;

        info!(kind = %kind, user_id = user.as_deref().unwrap_or("-"), "Manual sync requested");

        let report = execute(&self.inner, kind, user.as_deref(), stop).await;
        self.inner.complete(kind, user, report.clone());

        Ok(report)
    }

    /// Administrative variant: clears the target data before the full
    /// sync (products: hard-delete then repopulate; prices: blank values
    /// and digests). Role enforcement is the caller's responsibility.
    pub async fn run_forced_sync(
        &self,
        kind: SyncKind,
        user_id: Option<String>,
    ) -> Result<SyncReport, SchedulerError> {
        let user = normalize_user(kind, user_id)?;
        let stop = self.inner.try_begin(kind, user.clone())?;

        info!(kind = %kind, user_id = user.as_deref().unwrap_or("-"), "Forced sync requested");

        let cleared = match kind {
            SyncKind::Products => self.inner.store.purge_products().await,
            SyncKind::Prices => self.inner.store.blank_prices().await,
            _ => Ok(0),
        };

        let rows = match cleared {
            Ok(rows) => rows,
            Err(err) => {
                // Release the slot before surfacing the failure.
                self.inner.release(&(kind, user.clone()));
                return Err(err.into());
            }
        };
        if rows > 0 {
            info!(kind = %kind, rows, "Target data cleared for forced sync");
        }

        let report = execute(&self.inner, kind, user.as_deref(), stop).await;
        self.inner.complete(kind, user, report.clone());

        Ok(report)
    }

    /// Changes the interval of one kind; the timer rearms with the new
    /// period on its next tick.
    pub async fn update_interval(
        &self,
        kind: SyncKind,
        interval_minutes: i64,
    ) -> Result<(), SchedulerError> {
        self.inner.store.set_interval(kind, interval_minutes).await?;
        Ok(())
    }

    /// Enables or disables one kind; takes effect at the next tick.
    pub async fn set_enabled(&self, kind: SyncKind, enabled: bool) -> Result<(), SchedulerError> {
        self.inner.store.set_enabled(kind, enabled).await?;
        Ok(())
    }

    /// All persisted settings, for the admin surface.
    pub async fn settings(&self) -> Result<Vec<SyncSetting>, SchedulerError> {
        Ok(self.inner.store.all_settings().await?)
    }

    /// True while the slot token is held.
    pub fn is_running(&self, kind: SyncKind, user_id: Option<&str>) -> bool {
        let slot = (kind, user_id.map(str::to_string));
        lock(&self.inner.slots).contains_key(&slot)
    }

    /// The outcome of the most recent run of one slot, if any.
    pub fn last_run(&self, kind: SyncKind, user_id: Option<&str>) -> Option<LastRun> {
        let slot = (kind, user_id.map(str::to_string));
        lock(&self.inner.last_runs).get(&slot).cloned()
    }

    /// Trips every active token, awaits all running pipelines, then stops
    /// the timers. Pipelines return within one checkpoint interval.
    pub async fn stop(&self) {
        info!("Scheduler stopping");

        let _ = self.shutdown_tx.send(true);

        let run_handles: Vec<JoinHandle<()>> = {
            let mut slots = lock(&self.inner.slots);
            slots
                .values_mut()
                .filter_map(|running| {
                    running.stop.trip();
                    running.handle.take()
                })
                .collect()
        };

        for handle in run_handles {
            if let Err(err) = handle.await {
                error!(%err, "Sync task panicked during shutdown");
            }
        }

        let timers: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.timers));
        for timer in timers {
            if let Err(err) = timer.await {
                error!(%err, "Timer task panicked during shutdown");
            }
        }

        info!("Scheduler stopped");
    }
}

impl<S: SyncStore> Inner<S> {
    /// Acquires the slot token or reports Busy. Never queues.
    fn try_begin(&self, kind: SyncKind, user: Option<String>) -> Result<Arc<StopToken>, SchedulerError> {
        let slot = (kind, user.clone());
        let mut slots = lock(&self.slots);

        if slots.contains_key(&slot) {
            return Err(SchedulerError::Busy { kind, user_id: user });
        }

        let stop = StopToken::new();
        slots.insert(
            slot,
            RunningSync {
                stop: stop.clone(),
                handle: None,
            },
        );
        Ok(stop)
    }

    /// Attaches the join handle of a spawned run to its slot entry.
    fn register_handle(&self, slot: &Slot, handle: JoinHandle<()>) {
        let mut slots = lock(&self.slots);
        match slots.get_mut(slot) {
            Some(running) => running.handle = Some(handle),
            // The run already completed and released its slot.
            None => drop(handle),
        }
    }

    /// Releases the slot token without recording an outcome.
    fn release(&self, slot: &Slot) {
        lock(&self.slots).remove(slot);
    }

    /// Records the outcome and releases the slot token.
    fn complete(&self, kind: SyncKind, user: Option<String>, report: SyncReport) {
        let slot = (kind, user);

        lock(&self.last_runs).insert(
            slot.clone(),
            LastRun {
                finished_at: Utc::now().timestamp(),
                report,
            },
        );

        self.release(&slot);
    }
}

// =============================================================================
// Timer Loop
// =============================================================================

async fn timer_loop<S: SyncStore>(
    inner: Arc<Inner<S>>,
    kind: SyncKind,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(kind = %kind, "Timer loop running");

    loop {
        let minutes = match inner.store.setting(kind).await {
            Ok(Some(setting)) => setting.interval_minutes.max(1),
            Ok(None) => kind.default_interval_minutes(),
            Err(err) => {
                warn!(kind = %kind, %err, "Settings read failed, using default interval");
                kind.default_interval_minutes()
            }
        };
        let period = Duration::from_secs(minutes as u64 * 60);

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = shutdown.changed() => {
                // A dropped sender means the scheduler itself is gone.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        // Re-read at the tick so admin mutations apply without a restart.
        match inner.store.setting(kind).await {
            Ok(Some(setting)) if setting.enabled => {}
            Ok(_) => {
                debug!(kind = %kind, "Sync disabled, skipping tick");
                continue;
            }
            Err(err) => {
                warn!(kind = %kind, %err, "Settings read failed, kind degraded for this tick");
                continue;
            }
        }

        if kind.is_shared() {
            spawn_run(&inner, kind, None);
        } else {
            match inner.store.whitelisted_users().await {
                Ok(users) => {
                    if users.is_empty() {
                        debug!(kind = %kind, "No whitelisted users, nothing to do");
                    }
                    for user in users {
                        spawn_run(&inner, kind, Some(user.id));
                    }
                }
                Err(err) => {
                    warn!(kind = %kind, %err, "User list read failed, skipping tick");
                }
            }
        }
    }

    debug!(kind = %kind, "Timer loop stopped");
}

/// Launches one pipeline run in the background if the slot is free.
fn spawn_run<S: SyncStore>(inner: &Arc<Inner<S>>, kind: SyncKind, user: Option<String>) {
    let stop = match inner.try_begin(kind, user.clone()) {
        Ok(stop) => stop,
        Err(SchedulerError::Busy { .. }) => {
            debug!(
                kind = %kind,
                user_id = user.as_deref().unwrap_or("-"),
                "Previous run still in flight, skipping tick"
            );
            return;
        }
        Err(err) => {
            warn!(kind = %kind, %err, "Could not begin sync");
            return;
        }
    };

    let slot: Slot = (kind, user.clone());
    let task_inner = inner.clone();
    let handle = tokio::spawn(async move {
        let report = execute(&task_inner, kind, user.as_deref(), stop).await;
        task_inner.complete(kind, user, report);
    });

    inner.register_handle(&slot, handle);
}

/// Dispatches one run to its pipeline, draining the progress channel into
/// the log.
async fn execute<S: SyncStore>(
    inner: &Arc<Inner<S>>,
    kind: SyncKind,
    user: Option<&str>,
    stop: Arc<StopToken>,
) -> SyncReport {
    let (progress, mut progress_rx) = ProgressSender::channel();

    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            debug!(kind = %kind, percent = event.percent, label = %event.label, "Sync progress");
        }
    });

    let store = inner.store.clone();
    let source = inner.source.clone();

    let report = match (kind, user) {
        (SyncKind::Customers, Some(user_id)) => {
            let deps = SyncDeps::new(store, source, inner.parsers.customers.clone());
            sync_customers(&deps, user_id, &progress, &stop).await
        }
        (SyncKind::Orders, Some(user_id)) => {
            let deps = SyncDeps::new(store, source, inner.parsers.orders.clone());
            sync_orders(&deps, user_id, &progress, &stop).await
        }
        (SyncKind::Ddt, Some(user_id)) => {
            let deps = SyncDeps::new(store, source, inner.parsers.ddt.clone());
            sync_ddt(&deps, user_id, &progress, &stop).await
        }
        (SyncKind::Invoices, Some(user_id)) => {
            let deps = SyncDeps::new(store, source, inner.parsers.invoices.clone());
            sync_invoices(&deps, user_id, &progress, &stop).await
        }
        (SyncKind::Products, _) => {
            let deps = SyncDeps::new(store, source, inner.parsers.products.clone());
            sync_products(&deps, &progress, &stop).await
        }
        (SyncKind::Prices, _) => {
            let deps = SyncDeps::new(store, source, inner.parsers.prices.clone());
            sync_prices(&deps, &progress, &stop).await
        }
        (kind, None) => {
            // Guarded by normalize_user / the timer fan-out; kept as a
            // report so a bug here can never panic the scheduler.
            error!(kind = %kind, "Per-tenant sync dispatched without a user");
            let mut report = SyncReport::new();
            report.error = Some(fresis_core::SyncFailure {
                kind: fresis_core::SyncFailureKind::Store,
                message: format!("{kind} sync requires a user id"),
            });
            report
        }
    };

    drop(progress);
    let _ = progress_task.await;

    report
}

/// Validates the user argument against the kind's scope.
fn normalize_user(kind: SyncKind, user_id: Option<String>) -> Result<Option<String>, SchedulerError> {
    if kind.is_shared() {
        // Shared kinds always run under the service-account scope.
        Ok(None)
    } else {
        match user_id {
            Some(user) => Ok(Some(user)),
            None => Err(SchedulerError::UserRequired(kind)),
        }
    }
}

/// Locks a mutex, recovering from a poisoned lock: the maps guarded here
/// stay consistent even if a task panicked mid-update.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
