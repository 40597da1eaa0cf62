use std::time::Duration;

use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    log_info,
    timer::{TimerController, TimerSnapshot},
    utils::format::format_clock,
};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrayIcon {
    Active,
    Inactive,
}

/// What the tray shows: which icon, and the status line under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrayStatus {
    pub icon: TrayIcon,
    pub text: String,
}

impl TrayStatus {
    pub fn from_snapshot(snapshot: &TimerSnapshot) -> Self {
        match snapshot.task_name() {
            Some(task_name) if snapshot.is_running() => Self {
                icon: TrayIcon::Active,
                text: format!(
                    "Timer: {task_name} ({})",
                    format_clock(snapshot.elapsed())
                ),
            },
            _ => Self {
                icon: TrayIcon::Inactive,
                text: "Timer: Stopped".to_string(),
            },
        }
    }
}

/// Polls the timer and reports the tray status whenever it changes.
pub struct TrayMonitor {
    timer: TimerController,
    poll_interval: Duration,
    last: Option<TrayStatus>,
}

impl TrayMonitor {
    pub fn new(timer: TimerController, poll_interval: Duration) -> Self {
        Self {
            timer,
            poll_interval,
            last: None,
        }
    }

    /// One poll. `Some` when the icon or the text differs from the previous poll.
    pub async fn poll(&mut self) -> Option<TrayStatus> {
        let status = TrayStatus::from_snapshot(&self.timer.snapshot().await);
        if self.last.as_ref() == Some(&status) {
            return None;
        }

        let icon_changed = self.last.as_ref().map(|last| last.icon) != Some(status.icon);
        if icon_changed {
            log_info!("Tray icon now {:?}: {}", status.icon, status.text);
        }
        self.last = Some(status.clone());
        Some(status)
    }

    pub async fn run<F>(mut self, cancel: CancellationToken, mut on_change: F)
    where
        F: FnMut(&TrayStatus) + Send,
    {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(status) = self.poll().await {
                        on_change(&status);
                    }
                }
            }
        }

        log_info!("Tray monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{clock::testing::ManualClock, db::testing::test_database};

    fn timer() -> (tempfile::TempDir, ManualClock, TimerController) {
        let (dir, db) = test_database();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap());
        let timer = TimerController::new(db, Arc::new(clock.clone()));
        (dir, clock, timer)
    }

    #[tokio::test]
    async fn reports_only_changes() {
        let (_dir, clock, timer) = timer();
        let mut monitor = TrayMonitor::new(timer.clone(), Duration::from_secs(1));

        let idle = monitor.poll().await.unwrap();
        assert_eq!(idle.icon, TrayIcon::Inactive);
        assert_eq!(idle.text, "Timer: Stopped");
        assert_eq!(monitor.poll().await, None);

        timer.start_timer("writing").await.unwrap();
        clock.advance(Duration::from_secs(3725));
        let running = monitor.poll().await.unwrap();
        assert_eq!(running.icon, TrayIcon::Active);
        assert_eq!(running.text, "Timer: writing (01:02:05)");
        assert_eq!(monitor.poll().await, None);

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            monitor.poll().await.unwrap().text,
            "Timer: writing (01:02:06)"
        );

        timer.stop_timer().await.unwrap();
        assert_eq!(monitor.poll().await.unwrap().icon, TrayIcon::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn run_forwards_changes_until_cancelled() {
        let (_dir, clock, timer) = timer();
        timer.start_timer("writing").await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cancel = CancellationToken::new();
        let monitor = TrayMonitor::new(timer.clone(), Duration::from_secs(1));
        let handle = tokio::spawn(monitor.run(cancel.clone(), move |status: &TrayStatus| {
            sink.lock().unwrap().push(status.text.clone());
        }));

        time::sleep(Duration::from_millis(500)).await;
        clock.advance(Duration::from_secs(1));
        time::sleep(Duration::from_secs(1)).await;
        time::sleep(Duration::from_secs(1)).await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "Timer: writing (00:00:00)".to_string(),
                "Timer: writing (00:00:01)".to_string(),
            ]
        );
    }
}
