use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    db::{DayReport, TimeSlot},
    monitors::{DesktopNotifier, LongSessionMonitor, TrayMonitor, TrayStatus},
    settings::{NotificationSettings, TraySettings},
    timer::{commands, TimerSnapshot},
    utils::{
        format::{format_clock, format_duration},
        time::DATE_FORMAT,
    },
    AppState,
};

#[derive(Parser, Debug)]
#[command(name = "light-tracking", version)]
#[command(about = "Track time spent on named tasks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(
        long,
        global = true,
        env = "LIGHT_TRACKING_DIR",
        help = "Data directory. Defaults to the platform data directory"
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Print machine readable JSON")]
    pub json: bool,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Start tracking a task, stopping the current one")]
    Start {
        #[arg(required = true, num_args = 1.., help = "Task name")]
        task: Vec<String>,
    },
    #[command(about = "Stop the running timer")]
    Stop,
    #[command(about = "Show the running timer")]
    Status,
    #[command(about = "List time slots of a day")]
    List {
        #[command(flatten)]
        date: DateArg,
        #[arg(long, conflicts_with = "date", help = "List every time slot, newest first")]
        all: bool,
    },
    #[command(about = "Time per task for a day")]
    Stats(DateArg),
    #[command(about = "Edit a time slot")]
    Edit(EditArgs),
    #[command(about = "Delete a time slot")]
    Delete { id: i64 },
    #[command(about = "Run the tray status and long session monitors in the foreground")]
    Watch {
        #[arg(long, help = "Do not send long session notifications")]
        no_notify: bool,
    },
    #[command(about = "Show or change settings")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Args, Debug)]
pub struct DateArg {
    #[arg(long, help = "Day as YYYY-MM-DD. Defaults to today")]
    pub date: Option<String>,
}

impl DateArg {
    fn resolve(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| Local::now().format(DATE_FORMAT).to_string())
    }
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: i64,
    #[arg(long, help = "New task name")]
    pub task: Option<String>,
    #[arg(long, help = "New start time (RFC3339)")]
    pub start: Option<String>,
    #[arg(long, conflicts_with = "open", help = "New end time (RFC3339)")]
    pub end: Option<String>,
    #[arg(long, help = "Clear the end time, making the slot active")]
    pub open: bool,
}

/// An edit with every field filled in. `end` is empty when the slot should be open.
#[derive(Debug, PartialEq, Eq)]
struct SlotEdit {
    task_name: String,
    start: String,
    end: String,
}

impl EditArgs {
    /// Fields not given on the command line keep their stored value.
    fn merge(self, current: TimeSlot) -> SlotEdit {
        let end = match (self.open, self.end) {
            (true, _) => String::new(),
            (false, Some(end)) => end,
            (false, None) => current
                .end_time
                .map(|end| end.to_rfc3339())
                .unwrap_or_default(),
        };

        SlotEdit {
            task_name: self.task.unwrap_or(current.task_name),
            start: self
                .start
                .unwrap_or_else(|| current.start_time.to_rfc3339()),
            end,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        long_session_minutes: Option<u64>,
        #[arg(long)]
        notify_interval_secs: Option<u64>,
        #[arg(long)]
        tray_interval_secs: Option<u64>,
    },
}

pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", "light-tracking")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("could not determine a home directory; pass --data-dir"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn local_time(value: &DateTime<Utc>) -> String {
    value.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn describe_slot(slot: &TimeSlot) -> String {
    let end = slot
        .end_time
        .as_ref()
        .map(local_time)
        .unwrap_or_else(|| "running".to_string());
    format!(
        "#{:<5} {} - {:<8} {:>9}  {}",
        slot.id,
        local_time(&slot.start_time),
        end,
        format_clock(std::time::Duration::from_secs(slot.duration_seconds.max(0) as u64)),
        slot.task_name
    )
}

fn print_status(snapshot: &TimerSnapshot) {
    match snapshot.task_name() {
        Some(task_name) => println!(
            "Tracking '{}' for {} (since {})",
            task_name,
            format_clock(snapshot.elapsed()),
            snapshot
                .active_slot
                .as_ref()
                .map(|slot| local_time(&slot.start_time))
                .unwrap_or_default()
        ),
        None => println!("Not tracking"),
    }
}

fn print_report(report: &DayReport) {
    if report.tasks.is_empty() {
        println!("Nothing tracked on {}", report.date.format(DATE_FORMAT));
        return;
    }
    println!("{}", report.date.format(DATE_FORMAT));
    for task in &report.tasks {
        println!(
            "  {:>9}  {:>5.1}%  {}",
            format_clock(std::time::Duration::from_secs(task.total_seconds.max(0) as u64)),
            task.percentage,
            task.task_name
        );
    }
    println!(
        "  total {}",
        format_duration(std::time::Duration::from_secs(report.total_seconds.max(0) as u64))
    );
}

pub async fn dispatch(state: &AppState, cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Command::Start { task } => {
            let task_name = task.join(" ");
            let previous = state.timer.active_slot().await;
            let slot = commands::start_timer(state, &task_name).await?;
            if json {
                return print_json(&slot);
            }
            if let Some(previous) = previous {
                println!("Stopped '{}'", previous.task_name);
            }
            println!("Started '{}' (#{})", slot.task_name, slot.id);
        }
        Command::Stop => {
            let stopped = commands::stop_timer(state).await?;
            if json {
                return print_json(&stopped);
            }
            match stopped {
                Some(slot) => println!(
                    "Stopped '{}' after {}",
                    slot.task_name,
                    format_clock(std::time::Duration::from_secs(
                        slot.duration_seconds.max(0) as u64
                    ))
                ),
                None => println!("Timer is not running"),
            }
        }
        Command::Status => {
            let snapshot = commands::get_timer_state(state).await;
            if json {
                return print_json(&snapshot);
            }
            print_status(&snapshot);
        }
        Command::List { date, all } => {
            let slots = if all {
                commands::list_time_slots(state).await?
            } else {
                commands::get_time_slots_by_date(state, &date.resolve()).await?
            };
            if json {
                return print_json(&slots);
            }
            if slots.is_empty() {
                println!("No time slots");
            }
            for slot in &slots {
                println!("{}", describe_slot(slot));
            }
        }
        Command::Stats(date) => {
            let report = commands::get_task_statistics(state, &date.resolve()).await?;
            if json {
                return print_json(&report);
            }
            print_report(&report);
        }
        Command::Edit(args) => {
            let id = args.id;
            let current = state.db.get_time_slot(id).await?;
            let edit = args.merge(current);

            let slot =
                commands::update_time_slot(state, id, &edit.task_name, &edit.start, &edit.end)
                    .await?;
            if json {
                return print_json(&slot);
            }
            println!("{}", describe_slot(&slot));
        }
        Command::Delete { id } => {
            commands::delete_time_slot(state, id).await?;
            if !json {
                println!("Deleted #{id}");
            }
        }
        Command::Watch { no_notify } => watch(state, !no_notify).await?,
        Command::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => {
                if json {
                    return print_json(&state.settings.current());
                }
                println!("database: {}", state.db.path().display());
                println!("settings: {}", state.settings.path().display());
                println!("{}", serde_json::to_string_pretty(&state.settings.current())?);
            }
            ConfigAction::Set {
                notifications,
                long_session_minutes,
                notify_interval_secs,
                tray_interval_secs,
            } => {
                let current = state.settings.notifications();
                state.settings.update_notifications(NotificationSettings {
                    enabled: notifications.unwrap_or(current.enabled),
                    long_session_minutes: long_session_minutes
                        .unwrap_or(current.long_session_minutes),
                    poll_interval_secs: notify_interval_secs.unwrap_or(current.poll_interval_secs),
                })?;
                if let Some(poll_interval_secs) = tray_interval_secs {
                    state
                        .settings
                        .update_tray(TraySettings { poll_interval_secs })?;
                }
                if json {
                    return print_json(&state.settings.current());
                }
                println!("Settings saved");
            }
        },
    }
    Ok(())
}

async fn watch(state: &AppState, notify: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();
    let tray_interval = state.settings.tray().poll_interval();

    // Starts and stops arrive from other invocations through the store.
    tasks.push(tokio::spawn(
        state.timer.clone().follow_store(tray_interval, cancel.clone()),
    ));

    let tray = TrayMonitor::new(state.timer.clone(), tray_interval);
    tasks.push(tokio::spawn(tray.run(cancel.clone(), |status: &TrayStatus| {
        println!("{}", status.text);
    })));

    let notification_settings = state.settings.notifications();
    if notify && notification_settings.enabled {
        let monitor = LongSessionMonitor::new(
            state.timer.clone(),
            Arc::new(DesktopNotifier::default()),
            &notification_settings,
        );
        tasks.push(tokio::spawn(monitor.run(cancel.clone())));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    cancel.cancel();
    for task in tasks {
        task.await.context("monitor task panicked")?;
    }
    Ok(())
}
