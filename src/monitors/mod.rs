//! Background pollers that watch the timer: the long-session alert and the tray status line.
//! Both only read timer snapshots and stop when their cancellation token fires.

pub mod long_session;
pub mod notifier;
pub mod tray;

pub use long_session::LongSessionMonitor;
pub use notifier::{DesktopNotifier, Notifier};
pub use tray::{TrayIcon, TrayMonitor, TrayStatus};
