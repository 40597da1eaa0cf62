use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::db::TimeSlot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
}

/// In-memory view of the open slot. The store stays authoritative; this is refreshed from
/// it on startup and after manual edits.
#[derive(Debug, Clone, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Running {
        slot: TimeSlot,
        /// Time already elapsed when the anchor was taken (non-zero after recovery).
        elapsed_baseline: Duration,
        running_anchor: Instant,
    },
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TimerStatus {
        match self {
            TimerState::Idle => TimerStatus::Idle,
            TimerState::Running { .. } => TimerStatus::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running { .. })
    }

    pub fn active_slot(&self) -> Option<&TimeSlot> {
        match self {
            TimerState::Idle => None,
            TimerState::Running { slot, .. } => Some(slot),
        }
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        match self {
            TimerState::Idle => Duration::ZERO,
            TimerState::Running {
                elapsed_baseline,
                running_anchor,
                ..
            } => elapsed_baseline.saturating_add(now.saturating_duration_since(*running_anchor)),
        }
    }

    pub fn begin(&mut self, slot: TimeSlot, elapsed_baseline: Duration, now: Instant) {
        *self = TimerState::Running {
            slot,
            elapsed_baseline,
            running_anchor: now,
        };
    }

    pub fn clear(&mut self) {
        *self = TimerState::Idle;
    }
}
