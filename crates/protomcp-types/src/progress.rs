//! Progress tokens and progress notification parameters.
//!
//! A progress token is carried in `params._meta.progressToken` of the
//! originating request and echoed back in every
//! `notifications/progress` the handler emits for that request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RequestId;

/// An opaque progress-correlation token.
///
/// In practice this is almost always the originating request's id, but the
/// protocol permits any JSON string/number, so it is modeled independently
/// of [`RequestId`] with a conversion rather than a type alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Numeric token.
    Number(i64),
    /// String token.
    String(String),
}

impl From<RequestId> for ProgressToken {
    fn from(id: RequestId) -> Self {
        match id {
            RequestId::Number(n) => Self::Number(n),
            RequestId::String(s) => Self::String(s),
        }
    }
}

/// Payload of a `notifications/progress` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNotificationParams {
    /// Token matching the in-flight request this progress belongs to.
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Monotonically increasing progress value.
    pub progress: f64,
    /// Total expected value, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Free-form human-readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressNotificationParams {
    /// Convert to the `params` value of a `notifications/progress`
    /// [`crate::JsonRpcNotification`].
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("ProgressNotificationParams always serializes")
    }
}
