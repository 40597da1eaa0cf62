//! Request/response operations exposed to the presentation layer. Timestamps arrive as
//! RFC3339 text and dates as `YYYY-MM-DD`.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::{
    db::{DayReport, TaskTotal, TimeSlot},
    error::TrackerResult,
    timer::TimerSnapshot,
    utils::time::{parse_date, parse_optional_timestamp, parse_timestamp},
    AppState,
};

pub async fn get_timer_state(state: &AppState) -> TimerSnapshot {
    state.timer.snapshot().await
}

pub async fn get_elapsed_seconds(state: &AppState) -> u64 {
    state.timer.elapsed().await.as_secs()
}

pub async fn start_timer(state: &AppState, task_name: &str) -> TrackerResult<TimeSlot> {
    state.timer.start_timer(task_name).await
}

pub async fn stop_timer(state: &AppState) -> TrackerResult<Option<TimeSlot>> {
    state.timer.stop_timer().await
}

pub async fn get_time_slots_by_date(state: &AppState, date: &str) -> TrackerResult<Vec<TimeSlot>> {
    let date = parse_date(date)?;
    state.db.time_slots_by_date(date).await
}

pub async fn get_task_statistics(state: &AppState, date: &str) -> TrackerResult<DayReport> {
    let date = parse_date(date)?;
    let totals = state.db.task_totals_by_date(date).await?;
    Ok(build_day_report(date, totals))
}

pub async fn list_time_slots(state: &AppState) -> TrackerResult<Vec<TimeSlot>> {
    state.db.list_time_slots().await
}

/// `end_time` may be empty to leave the slot open.
pub async fn update_time_slot(
    state: &AppState,
    id: i64,
    task_name: &str,
    start_time: &str,
    end_time: &str,
) -> TrackerResult<TimeSlot> {
    let start_time = parse_timestamp(start_time, "start_time")?;
    let end_time = parse_optional_timestamp(end_time, "end_time")?;
    state
        .timer
        .update_time_slot(id, task_name, start_time, end_time)
        .await
}

pub async fn delete_time_slot(state: &AppState, id: i64) -> TrackerResult<()> {
    state.timer.delete_time_slot(id).await
}

/// Sort per-task totals longest first (ties by name) and attach each task's share of the day.
pub fn build_day_report(date: NaiveDate, totals: HashMap<String, i64>) -> DayReport {
    let total_seconds: i64 = totals.values().sum();

    let mut tasks: Vec<TaskTotal> = totals
        .into_iter()
        .map(|(task_name, seconds)| TaskTotal {
            task_name,
            total_seconds: seconds,
            percentage: if total_seconds > 0 {
                seconds as f64 * 100.0 / total_seconds as f64
            } else {
                0.0
            },
        })
        .collect();
    tasks.sort_by(|a, b| {
        b.total_seconds
            .cmp(&a.total_seconds)
            .then_with(|| a.task_name.cmp(&b.task_name))
    });

    DayReport {
        date,
        total_seconds,
        tasks,
    }
}
