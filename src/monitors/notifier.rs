use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Delivers a desktop alert.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> Result<()>;
}

/// Shells out to whatever the platform offers for notifications.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new("Light Tracking")
    }
}

async fn run(command: &mut Command, program: &str) -> Result<()> {
    let status = command
        .status()
        .await
        .with_context(|| format!("failed to spawn {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_powershell_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "''")
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        if cfg!(target_os = "linux") {
            let notify_send = run(
                Command::new("notify-send")
                    .arg(title)
                    .arg(message)
                    .arg(format!("--app-name={}", self.app_name)),
                "notify-send",
            )
            .await;
            if notify_send.is_ok() {
                return Ok(());
            }

            run(
                Command::new("dbus-send").args([
                    "--type=method_call".to_string(),
                    "--dest=org.freedesktop.Notifications".to_string(),
                    "/org/freedesktop/Notifications".to_string(),
                    "org.freedesktop.Notifications.Notify".to_string(),
                    format!("string:{}", self.app_name),
                    "uint32:0".to_string(),
                    "string:".to_string(),
                    format!("string:{title}"),
                    format!("string:{message}"),
                    "array:string:".to_string(),
                    "dict:string:string:".to_string(),
                    "int32:5000".to_string(),
                ]),
                "dbus-send",
            )
            .await
        } else if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(message),
                escape_applescript(title)
            );
            run(Command::new("osascript").arg("-e").arg(script), "osascript").await
        } else if cfg!(target_os = "windows") {
            let script = format!(
                "[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null; \
                 [Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] | Out-Null; \
                 $xml = [Windows.Data.Xml.Dom.XmlDocument]::new(); \
                 $xml.LoadXml('<toast><visual><binding template=\"ToastText02\"><text id=\"1\">{}</text><text id=\"2\">{}</text></binding></visual></toast>'); \
                 $toast = [Windows.UI.Notifications.ToastNotification]::new($xml); \
                 [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('{}').Show($toast)",
                escape_powershell_xml(title),
                escape_powershell_xml(message),
                escape_powershell_xml(&self.app_name)
            );
            run(
                Command::new("powershell").arg("-Command").arg(script),
                "powershell",
            )
            .await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every notification instead of showing it.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, title: &str, message: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
            Ok(())
        }
    }
}
