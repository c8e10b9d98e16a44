//! User-facing error messages
//!
//! Static lookup keyed by error kind, with optional per-model overrides.

use std::fmt;
use serde::Serialize;

use common::error::ErrorKind;

/// Suggested recovery step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    CheckConnection,
    RetryLater,
    FreeUpStorage,
    CloseOtherApps,
    RestartApp,
    ReinstallModel,
    ContinueWithReducedFeatures,
    ContactSupport,
}

impl RecoveryAction {
    pub fn description(&self) -> &'static str {
        match self {
            RecoveryAction::CheckConnection => "Check your internet connection",
            RecoveryAction::RetryLater => "Try again in a few minutes",
            RecoveryAction::FreeUpStorage => "Free up storage space on your device",
            RecoveryAction::CloseOtherApps => "Close other apps to free memory",
            RecoveryAction::RestartApp => "Restart the app",
            RecoveryAction::ReinstallModel => "Clear the model cache and download again",
            RecoveryAction::ContinueWithReducedFeatures => "Continue with reduced features",
            RecoveryAction::ContactSupport => "Contact support if the problem persists",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Message shown to the user for a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    pub title: String,
    pub message: String,
    /// Ordered recovery suggestions
    pub actions: Vec<RecoveryAction>,
}

impl UserMessage {
    fn new(title: &str, message: &str, actions: &[RecoveryAction]) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            actions: actions.to_vec(),
        }
    }
}

/// Messages that replace the generic one for a specific model
fn model_override(model_name: &str, kind: ErrorKind) -> Option<UserMessage> {
    use RecoveryAction::*;

    let message = match (model_name, kind) {
        ("face-detector", ErrorKind::Network) => UserMessage::new(
            "Face detection unavailable",
            "Face detection needs a one-time download. Connect to the internet to enable it.",
            &[CheckConnection, ContinueWithReducedFeatures],
        ),
        ("image-embedder", ErrorKind::Memory) => UserMessage::new(
            "Not enough memory",
            "Finding similar photos needs more memory than is available right now.",
            &[CloseOtherApps, ContinueWithReducedFeatures, RestartApp],
        ),
        ("image-embedder", ErrorKind::Storage) => UserMessage::new(
            "Not enough storage",
            "Similar photo detection needs space for its model files.",
            &[FreeUpStorage, ContinueWithReducedFeatures],
        ),
        _ => return None,
    };

    Some(message)
}

/// Looks up the message for an error kind, preferring a model-specific one
pub fn user_message(kind: ErrorKind, model_name: Option<&str>) -> UserMessage {
    use RecoveryAction::*;

    if let Some(message) = model_name.and_then(|name| model_override(name, kind)) {
        return message;
    }

    match kind {
        ErrorKind::Network => UserMessage::new(
            "Connection problem",
            "A model could not be downloaded.",
            &[CheckConnection, RetryLater],
        ),
        ErrorKind::Storage => UserMessage::new(
            "Storage problem",
            "Model files could not be saved or read.",
            &[FreeUpStorage, RetryLater, ContactSupport],
        ),
        ErrorKind::Memory => UserMessage::new(
            "Not enough memory",
            "There is not enough free memory to run this feature.",
            &[CloseOtherApps, RestartApp],
        ),
        ErrorKind::InvalidModel => UserMessage::new(
            "Model problem",
            "A model file is damaged or unsupported.",
            &[ReinstallModel, ContactSupport],
        ),
        ErrorKind::Initialization => UserMessage::new(
            "Startup problem",
            "A model could not be started.",
            &[RestartApp, ContactSupport],
        ),
        ErrorKind::Timeout => UserMessage::new(
            "Taking too long",
            "Loading a model took longer than expected.",
            &[CheckConnection, RetryLater],
        ),
        ErrorKind::DimensionMismatch => UserMessage::new(
            "Analysis problem",
            "Photo analysis results are incompatible with each other.",
            &[ReinstallModel, ContactSupport],
        ),
        ErrorKind::ConcurrentOperation => UserMessage::new(
            "Busy",
            "This model is already being prepared.",
            &[RetryLater],
        ),
        ErrorKind::Unknown => UserMessage::new(
            "Something went wrong",
            "An unexpected error occurred.",
            &[RestartApp, ContactSupport],
        ),
    }
}
