use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    log_error, log_info,
    settings::NotificationSettings,
    timer::TimerController,
    utils::format::format_duration,
};

use super::Notifier;

const ENABLE_LOGS: bool = true;

pub const ALERT_TITLE: &str = "Long Session Alert";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongSessionAlert {
    pub title: String,
    pub message: String,
}

/// True once the session has reached `threshold` and no alert went out in the last
/// `threshold` (or ever).
pub fn alert_due(elapsed: Duration, since_last_alert: Option<Duration>, threshold: Duration) -> bool {
    elapsed >= threshold && since_last_alert.map_or(true, |since| since >= threshold)
}

pub fn alert_message(task_name: &str, elapsed: Duration) -> String {
    format!(
        "You've been working on '{task_name}' for {}",
        format_duration(elapsed)
    )
}

/// Polls the timer and nags when a single session runs too long.
pub struct LongSessionMonitor {
    timer: TimerController,
    notifier: Arc<dyn Notifier>,
    threshold: Duration,
    poll_interval: Duration,
    last_alert: Option<Instant>,
}

impl LongSessionMonitor {
    pub fn new(
        timer: TimerController,
        notifier: Arc<dyn Notifier>,
        settings: &NotificationSettings,
    ) -> Self {
        Self {
            timer,
            notifier,
            threshold: settings.long_session(),
            poll_interval: settings.poll_interval(),
            last_alert: None,
        }
    }

    /// One poll. Returns the alert when one was sent.
    pub async fn check(&mut self) -> Option<LongSessionAlert> {
        let snapshot = self.timer.snapshot().await;
        let task_name = snapshot.task_name()?;

        let now = self.timer.clock().instant();
        let since_last_alert = self
            .last_alert
            .map(|sent| now.saturating_duration_since(sent));
        if !alert_due(snapshot.elapsed(), since_last_alert, self.threshold) {
            return None;
        }

        let alert = LongSessionAlert {
            title: ALERT_TITLE.to_string(),
            message: alert_message(task_name, snapshot.elapsed()),
        };
        if let Err(err) = self.notifier.notify(&alert.title, &alert.message).await {
            log_error!("Failed to deliver long session alert: {err:#}");
        } else {
            log_info!("{}", alert.message);
        }
        self.last_alert = Some(now);

        Some(alert)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first check happens one period in.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.check().await;
                }
            }
        }

        log_info!("Long session monitor stopped");
    }
}
