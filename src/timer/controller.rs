use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::RwLock,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    db::{repositories::time_slots::validate_task_name, Database, TimeSlot},
    error::TrackerResult,
    log_error, log_info, log_warn,
};

use super::{TimerState, TimerStatus};

const ENABLE_LOGS: bool = true;

/// Read-only copy of the timer, handed to pollers and the presentation layer.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub active_slot: Option<TimeSlot>,
    pub elapsed_seconds: u64,
}

impl TimerSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn task_name(&self) -> Option<&str> {
        self.active_slot.as_ref().map(|slot| slot.task_name.as_str())
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs(self.elapsed_seconds)
    }
}

/// Owns the single timer. Start, stop, recovery and edits hold the write lock across their
/// store calls so they never interleave; status reads only take the read lock.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<RwLock<TimerState>>,
    db: Database,
    clock: Arc<dyn Clock>,
}

impl TimerController {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(TimerState::new())),
            db,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start tracking `task_name`. A running slot is closed first at the exact instant the
    /// new one begins; if that close fails nothing new is created.
    pub async fn start_timer(&self, task_name: &str) -> TrackerResult<TimeSlot> {
        validate_task_name(task_name)?;

        let mut state = self.state.write().await;
        let now = self.clock.time();

        if let Some(previous) = state.active_slot().cloned() {
            let closed = self.db.close_time_slot(previous.id, now).await?;
            log_info!(
                "Stopped '{}' after {}s to start '{}'",
                closed.task_name,
                closed.duration_seconds,
                task_name
            );
            state.clear();
        }

        let slot = self.db.create_time_slot(task_name, now).await?;
        state.begin(slot.clone(), Duration::ZERO, self.clock.instant());
        log_info!("Started time slot {} for '{}'", slot.id, slot.task_name);

        Ok(slot)
    }

    /// Close the running slot. Stopping an idle timer is a no-op.
    pub async fn stop_timer(&self) -> TrackerResult<Option<TimeSlot>> {
        let mut state = self.state.write().await;
        let Some(active) = state.active_slot().cloned() else {
            return Ok(None);
        };

        let closed = self.db.close_time_slot(active.id, self.clock.time()).await?;
        state.clear();
        log_info!(
            "Stopped time slot {} ('{}') after {}s",
            closed.id,
            closed.task_name,
            closed.duration_seconds
        );

        Ok(Some(closed))
    }

    /// Reload the open slot from the store. Elapsed time continues from the persisted start.
    pub async fn recover_from_store(&self) -> TrackerResult<Option<TimeSlot>> {
        let mut state = self.state.write().await;
        self.load_active(&mut state).await
    }

    /// Pick up starts, stops and edits made by other processes sharing the store. Returns
    /// true when the in-memory timer changed.
    pub async fn refresh(&self) -> TrackerResult<bool> {
        let mut state = self.state.write().await;
        let stored = self.db.active_time_slot().await?;
        if stored.as_ref() == state.active_slot() {
            return Ok(false);
        }

        if stored.is_none() {
            log_info!("Active slot was closed outside this process");
        }
        self.apply_active(&mut state, stored.as_ref());
        Ok(true)
    }

    /// Refresh from the store every `period` until cancelled. Store errors are logged and
    /// the previous state is kept.
    pub async fn follow_store(self, period: Duration, cancel: CancellationToken) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.refresh().await {
                        log_error!("Failed to refresh timer from store: {err}");
                    }
                }
            }
        }
    }

    /// Manual edit of any slot. The timer is resynchronised afterwards since the edit may
    /// have touched, closed or reopened the active slot.
    pub async fn update_time_slot(
        &self,
        id: i64,
        task_name: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> TrackerResult<TimeSlot> {
        let mut state = self.state.write().await;
        let updated = self
            .db
            .update_time_slot(id, task_name, start_time, end_time)
            .await?;
        self.load_active(&mut state).await?;
        Ok(updated)
    }

    pub async fn delete_time_slot(&self, id: i64) -> TrackerResult<()> {
        let mut state = self.state.write().await;
        self.db.delete_time_slot(id).await?;
        self.load_active(&mut state).await?;
        Ok(())
    }

    pub async fn elapsed(&self) -> Duration {
        self.state.read().await.elapsed_at(self.clock.instant())
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.is_running()
    }

    pub async fn active_task_name(&self) -> Option<String> {
        self.state
            .read()
            .await
            .active_slot()
            .map(|slot| slot.task_name.clone())
    }

    pub async fn active_slot(&self) -> Option<TimeSlot> {
        self.state.read().await.active_slot().cloned()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let state = self.state.read().await;
        TimerSnapshot {
            status: state.status(),
            active_slot: state.active_slot().cloned(),
            elapsed_seconds: state.elapsed_at(self.clock.instant()).as_secs(),
        }
    }

    async fn load_active(&self, state: &mut TimerState) -> TrackerResult<Option<TimeSlot>> {
        let active = self.db.active_time_slot().await?;
        self.apply_active(state, active.as_ref());
        Ok(active)
    }

    fn apply_active(&self, state: &mut TimerState, active: Option<&TimeSlot>) {
        match active {
            Some(slot) => {
                let already_elapsed = (self.clock.time() - slot.start_time)
                    .to_std()
                    .unwrap_or_else(|_| {
                        log_warn!("Active slot {} starts in the future", slot.id);
                        Duration::ZERO
                    });
                state.begin(slot.clone(), already_elapsed, self.clock.instant());
                log_info!(
                    "Timer running for '{}' (slot {}, {}s elapsed)",
                    slot.task_name,
                    slot.id,
                    already_elapsed.as_secs()
                );
            }
            None => state.clear(),
        }
    }
}
