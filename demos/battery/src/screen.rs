//! Second native screen and the coordinator that relays its result.

use crate::protocol::{TransferRecord, ON_RESULT};
use platform_channel_core::{MethodChannel, MethodResult, MethodResultSink, Parcelable};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Text the "change" button puts on the second screen.
pub const CHANGED_TEXT: &str = "native page text";

/// Short user-facing notices.
pub trait Toast: Send + Sync {
    fn show(&self, text: &str);
}

/// Toasts written to the log.
pub struct LogToast;

impl Toast for LogToast {
    fn show(&self, text: &str) {
        tracing::info!(target: "toast", "{}", text);
    }
}

/// The second screen: one text view and a "change" button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondScreen {
    text: String,
}

impl SecondScreen {
    /// Opens from launch extras in parcel form. Missing or unreadable extras
    /// leave the text empty.
    pub fn open(extras: Option<&[u8]>) -> Self {
        let record = extras.and_then(|bytes| match TransferRecord::from_bytes(bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring unreadable screen extras: {}", e);
                None
            }
        });
        Self {
            text: record.and_then(|r| r.name).unwrap_or_default(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// The "change" button.
    pub fn change(&mut self) {
        self.text = CHANGED_TEXT.to_string();
    }

    /// Back navigation: closes the screen and hands back what it shows.
    pub fn back(self) -> TransferRecord {
        TransferRecord::named(self.text)
    }
}

/// Parcel form of `record`, or nothing when it cannot be flattened.
fn parcel_bytes(record: &TransferRecord) -> Option<Vec<u8>> {
    match record.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!("Dropping screen record: {}", e);
            None
        }
    }
}

/// Return path for a closing second screen.
#[derive(Debug)]
pub struct ScreenResult {
    tx: oneshot::Sender<Option<Vec<u8>>>,
}

impl ScreenResult {
    pub fn channel() -> (Self, oneshot::Receiver<Option<Vec<u8>>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn finish(self, record: Option<TransferRecord>) {
        let _ = self.tx.send(record.as_ref().and_then(parcel_bytes));
    }
}

/// Screen presentation facility.
pub trait ScreenLauncher: Send + Sync {
    /// Presents `screen`; the screen reports through `result` when it closes.
    fn launch(&self, screen: SecondScreen, result: ScreenResult);
}

/// Launcher that plays a fixed interaction on every screen: wait, optionally
/// edit the text, then navigate back.
pub struct ScriptedLauncher {
    pub dwell: Duration,
    pub rename_to: Option<String>,
    pub press_change: bool,
}

impl ScreenLauncher for ScriptedLauncher {
    fn launch(&self, mut screen: SecondScreen, result: ScreenResult) {
        tracing::info!("Second screen opened showing {:?}", screen.text());
        let dwell = self.dwell;
        let rename_to = self.rename_to.clone();
        let press_change = self.press_change;
        tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            if press_change {
                screen.change();
            }
            if let Some(name) = rename_to {
                screen.set_text(name);
            }
            tracing::info!("Second screen closing with {:?}", screen.text());
            result.finish(Some(screen.back()));
        });
    }
}

/// Handles `openPage` and relays the second screen's result to the UI.
pub struct ScreenCoordinator {
    intent: MethodChannel,
    launcher: Arc<dyn ScreenLauncher>,
    toast: Arc<dyn Toast>,
}

impl ScreenCoordinator {
    pub fn new(intent: MethodChannel, launcher: Arc<dyn ScreenLauncher>, toast: Arc<dyn Toast>) -> Self {
        Self {
            intent,
            launcher,
            toast,
        }
    }

    /// Starts the second screen. Answers as soon as it is presented; the
    /// edited record comes back later through `onResult`.
    pub fn open_page(self: &Arc<Self>, arguments: Option<Value>, result: MethodResultSink) {
        let extras = match arguments {
            Some(Value::Object(map)) => parcel_bytes(&TransferRecord::from_map(Some(&map))),
            Some(other) => {
                tracing::debug!("openPage argument is not a map: {}", other);
                None
            }
            None => None,
        };

        let (screen_result, closed) = ScreenResult::channel();
        self.launcher.launch(SecondScreen::open(extras.as_deref()), screen_result);
        result.success(Value::Null);

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            match closed.await {
                Ok(Some(bytes)) => match TransferRecord::from_bytes(&bytes) {
                    Ok(record) => coordinator.deliver_result(record).await,
                    Err(e) => tracing::warn!("Second screen returned unreadable data: {}", e),
                },
                Ok(None) => tracing::debug!("Second screen closed without a result"),
                Err(_) => tracing::debug!("Second screen went away without closing"),
            }
        });
    }

    /// Invokes `onResult` on the UI. The outcome is only shown, never
    /// propagated.
    pub async fn deliver_result(&self, record: TransferRecord) {
        let arguments = Value::Object(record.to_map());
        let notice = match self.intent.invoke_method(ON_RESULT, Some(arguments)).await {
            Ok(MethodResult::Success(_)) => "onResult delivered".to_string(),
            Ok(MethodResult::Error(error)) => format!("onResult failed: {} {}", error.code, error.message),
            Ok(MethodResult::NotImplemented) => "onResult not implemented by the UI".to_string(),
            Err(e) => format!("onResult not delivered: {e}"),
        };
        self.toast.show(&notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_shows_and_returns_name() {
        let bytes = TransferRecord::named("Alice").to_bytes().unwrap();
        let mut screen = SecondScreen::open(Some(&bytes));
        assert_eq!(screen.text(), "Alice");
        screen.change();
        assert_eq!(screen.back(), TransferRecord::named(CHANGED_TEXT));
    }

    #[test]
    fn screen_without_or_with_bad_extras() {
        assert_eq!(SecondScreen::open(None).text(), "");
        assert_eq!(SecondScreen::open(Some(&[9, 9])).text(), "");
        let unnamed = TransferRecord::default().to_bytes().unwrap();
        assert_eq!(SecondScreen::open(Some(&unnamed)).text(), "");
    }

    #[tokio::test]
    async fn scripted_launcher_returns_edited_record() {
        let launcher = ScriptedLauncher {
            dwell: Duration::from_millis(1),
            rename_to: Some("Bob".into()),
            press_change: false,
        };
        let (result, closed) = ScreenResult::channel();
        launcher.launch(SecondScreen::open(None), result);
        let bytes = closed.await.unwrap().unwrap();
        assert_eq!(TransferRecord::from_bytes(&bytes).unwrap(), TransferRecord::named("Bob"));
    }
}
