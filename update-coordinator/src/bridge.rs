use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{lock_or_recover, BridgeError, TransportEventKind};

pub const UPDATE_CHECK_CHANNEL: &str = "update:check";
pub const UPDATE_DOWNLOAD_CHANNEL: &str = "update:download";
pub const UPDATE_CANCEL_CHANNEL: &str = "update:cancel";
pub const UPDATE_INSTALL_CHANNEL: &str = "update:install";
pub const UPDATE_CONFIRM_INSTALL_CHANNEL: &str = "update:confirm-install";

pub const UPDATE_AVAILABLE_EVENT: &str = "update:available";
pub const UPDATE_NOT_AVAILABLE_EVENT: &str = "update:not-available";
pub const UPDATE_PROGRESS_EVENT: &str = "update:progress";
pub const UPDATE_DOWNLOADED_EVENT: &str = "update:downloaded";
pub const UPDATE_ERROR_EVENT: &str = "update:error";

/// Injected into the primary window before page scripts run; exposes `window.desktopUpdate`.
pub const UPDATE_BRIDGE_SCRIPT: &str = include_str!("update_bridge.js");

pub fn event_channel(kind: TransportEventKind) -> &'static str {
    match kind {
        TransportEventKind::Available => UPDATE_AVAILABLE_EVENT,
        TransportEventKind::NotAvailable => UPDATE_NOT_AVAILABLE_EVENT,
        TransportEventKind::Progress => UPDATE_PROGRESS_EVENT,
        TransportEventKind::Downloaded => UPDATE_DOWNLOADED_EVENT,
        TransportEventKind::Error => UPDATE_ERROR_EVENT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeRequest {
    Check,
    Download,
    Cancel,
    Install,
    ConfirmInstall,
}

impl BridgeRequest {
    pub const ALL: [BridgeRequest; 5] = [
        BridgeRequest::Check,
        BridgeRequest::Download,
        BridgeRequest::Cancel,
        BridgeRequest::Install,
        BridgeRequest::ConfirmInstall,
    ];

    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            UPDATE_CHECK_CHANNEL => Some(Self::Check),
            UPDATE_DOWNLOAD_CHANNEL => Some(Self::Download),
            UPDATE_CANCEL_CHANNEL => Some(Self::Cancel),
            UPDATE_INSTALL_CHANNEL => Some(Self::Install),
            UPDATE_CONFIRM_INSTALL_CHANNEL => Some(Self::ConfirmInstall),
            _ => None,
        }
    }

    pub fn channel(self) -> &'static str {
        match self {
            Self::Check => UPDATE_CHECK_CHANNEL,
            Self::Download => UPDATE_DOWNLOAD_CHANNEL,
            Self::Cancel => UPDATE_CANCEL_CHANNEL,
            Self::Install => UPDATE_INSTALL_CHANNEL,
            Self::ConfirmInstall => UPDATE_CONFIRM_INSTALL_CHANNEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UpdateCheckResult {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            has_update: Some(false),
            version: None,
            release_notes: None,
            message: Some(message.into()),
        }
    }

    pub fn up_to_date() -> Self {
        Self {
            success: true,
            has_update: Some(false),
            version: None,
            release_notes: None,
            message: None,
        }
    }

    pub fn available(version: String, release_notes: String) -> Self {
        Self {
            success: true,
            has_update: Some(true),
            version: Some(version),
            release_notes: Some(release_notes),
            message: None,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            has_update: None,
            version: None,
            release_notes: None,
            message: Some(message),
        }
    }
}

/// Reply to the fire-and-forget requests (download, cancel, install, confirm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RequestAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePayload {
    pub version: String,
    pub release_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedPayload {
    pub version: String,
    pub release_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmInstallArgs {
    pub restart_now: bool,
}

pub type RequestHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, BridgeError>> + Send + Sync>;

pub fn request_handler<F, Fut>(handler: F) -> RequestHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BridgeError>> + Send + 'static,
{
    Arc::new(move |args| handler(args).boxed())
}

/// Request table between the UI and the main process.
///
/// Only the bridge channels are accepted, and each takes exactly one
/// handler, mirroring the hosting runtime's rule.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<BridgeRequest, RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs every handler or none of them.
    pub fn handle_all(
        &self,
        entries: Vec<(BridgeRequest, RequestHandler)>,
    ) -> Result<(), BridgeError> {
        let mut handlers = lock_or_recover(&self.handlers);
        for (index, (request, _)) in entries.iter().enumerate() {
            let repeated = entries[..index].iter().any(|(earlier, _)| earlier == request);
            if repeated || handlers.contains_key(request) {
                return Err(BridgeError::DuplicateHandler {
                    channel: request.channel().to_string(),
                });
            }
        }

        handlers.extend(entries);
        Ok(())
    }

    pub async fn invoke(&self, channel: &str, args: Value) -> Result<Value, BridgeError> {
        let request =
            BridgeRequest::from_channel(channel).ok_or_else(|| BridgeError::UnknownChannel {
                channel: channel.to_string(),
            })?;
        let handler = lock_or_recover(&self.handlers)
            .get(&request)
            .cloned()
            .ok_or_else(|| BridgeError::NoHandler {
                channel: channel.to_string(),
            })?;
        handler(args).await
    }

    pub fn handler_count(&self) -> usize {
        lock_or_recover(&self.handlers).len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut channels: Vec<&'static str> = lock_or_recover(&self.handlers)
            .keys()
            .map(|request| request.channel())
            .collect();
        channels.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("channels", &channels)
            .finish()
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bridge_request_round_trips_all_channels() {
        for request in BridgeRequest::ALL {
            assert_eq!(BridgeRequest::from_channel(request.channel()), Some(request));
        }
        assert_eq!(BridgeRequest::from_channel("update:unknown"), None);
    }

    #[test]
    fn event_channels_are_namespaced_transport_names() {
        for kind in TransportEventKind::ALL {
            assert_eq!(event_channel(kind), format!("update:{}", kind.name()));
        }
    }

    #[test]
    fn check_result_omits_absent_fields() {
        let skipped = serde_json::to_value(UpdateCheckResult::skipped("dev build")).unwrap();
        assert_eq!(
            skipped,
            json!({"success": true, "hasUpdate": false, "message": "dev build"})
        );

        let failed = serde_json::to_value(UpdateCheckResult::failed("offline".into())).unwrap();
        assert_eq!(failed, json!({"success": false, "message": "offline"}));

        let available = serde_json::to_value(UpdateCheckResult::available(
            "2.0.0".into(),
            "notes".into(),
        ))
        .unwrap();
        assert_eq!(
            available,
            json!({"success": true, "hasUpdate": true, "version": "2.0.0", "releaseNotes": "notes"})
        );
    }

    #[test]
    fn confirm_install_args_use_camel_case() {
        let args: ConfirmInstallArgs = serde_json::from_value(json!({"restartNow": true})).unwrap();
        assert!(args.restart_now);
    }

    #[test]
    fn bridge_script_exposes_every_request_and_event() {
        for request in BridgeRequest::ALL {
            assert!(UPDATE_BRIDGE_SCRIPT.contains(request.channel()));
        }
        for kind in TransportEventKind::ALL {
            assert!(UPDATE_BRIDGE_SCRIPT.contains(event_channel(kind)));
        }
        assert!(UPDATE_BRIDGE_SCRIPT.contains("removeAllListeners"));
        assert!(UPDATE_BRIDGE_SCRIPT.contains("update_bridge_invoke"));
    }

    #[test]
    fn bridge_script_asks_the_shell_whether_it_is_desktop() {
        assert!(UPDATE_BRIDGE_SCRIPT.contains("update_bridge_is_desktop_runtime"));
    }

    #[tokio::test]
    async fn registry_invokes_registered_handler() {
        let registry = HandlerRegistry::new();
        registry
            .handle_all(vec![(
                BridgeRequest::Install,
                request_handler(|args| async move { Ok(json!({ "echo": args })) }),
            )])
            .unwrap();

        let reply = registry
            .invoke(UPDATE_INSTALL_CHANNEL, json!(7))
            .await
            .unwrap();
        assert_eq!(reply, json!({"echo": 7}));
    }

    #[tokio::test]
    async fn registry_rejects_second_handler_and_unknown_channel() {
        let registry = HandlerRegistry::new();
        let noop = || request_handler(|_| async { Ok(Value::Null) });
        registry
            .handle_all(vec![(BridgeRequest::Check, noop())])
            .unwrap();

        let duplicate = registry.handle_all(vec![(BridgeRequest::Check, noop())]);
        assert_eq!(
            duplicate,
            Err(BridgeError::DuplicateHandler {
                channel: UPDATE_CHECK_CHANNEL.to_string()
            })
        );
        assert_eq!(registry.handler_count(), 1);

        let missing = registry.invoke(UPDATE_CANCEL_CHANNEL, Value::Null).await;
        assert_eq!(
            missing,
            Err(BridgeError::NoHandler {
                channel: UPDATE_CANCEL_CHANNEL.to_string()
            })
        );

        let unknown = registry.invoke("update:uninstall", Value::Null).await;
        assert_eq!(
            unknown,
            Err(BridgeError::UnknownChannel {
                channel: "update:uninstall".to_string()
            })
        );
    }

    #[test]
    fn failed_batch_installs_nothing() {
        let registry = HandlerRegistry::new();
        let noop = || request_handler(|_| async { Ok(Value::Null) });
        registry
            .handle_all(vec![(BridgeRequest::Cancel, noop())])
            .unwrap();

        let batch = registry.handle_all(vec![
            (BridgeRequest::Check, noop()),
            (BridgeRequest::Download, noop()),
            (BridgeRequest::Cancel, noop()),
        ]);
        assert!(matches!(batch, Err(BridgeError::DuplicateHandler { .. })));
        assert_eq!(registry.handler_count(), 1);

        let repeated = registry.handle_all(vec![
            (BridgeRequest::Install, noop()),
            (BridgeRequest::Install, noop()),
        ]);
        assert!(matches!(repeated, Err(BridgeError::DuplicateHandler { .. })));
        assert_eq!(registry.handler_count(), 1);
    }
}
