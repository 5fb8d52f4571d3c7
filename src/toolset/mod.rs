//! Toolset: the action/trigger platform agents act through.
//!
//! [`Toolset`] is the seam between agent logic and whatever executes actions.
//! Two implementations ship with the crate:
//! - [`HttpToolset`]: the hosted platform's REST API (actions and triggers)
//! - [`DockerWorkspace`]: a local Docker container serving the file and shell
//!   actions the benchmark needs
//!
//! [`TriggerListener`] receives trigger events over a webhook and dispatches
//! them to registered callbacks.

pub mod action;
pub mod docker;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod triggers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolsetError;

pub use action::Action;
pub use docker::{DockerWorkspace, ExecOutput, WorkspaceOptions, WORKSPACE_HOME};
pub use http::{HttpToolset, TriggerInfo, TriggerStatus, DEFAULT_TOOLSET_BASE_URL};
pub use triggers::{TriggerEvent, TriggerFilter, TriggerListener};

/// Result of executing one action.
///
/// The hosted API spells the success flag `successfull`; both spellings are
/// accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default, alias = "successfull")]
    pub successful: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            successful: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            successful: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    /// String field of `data`, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Compact text form handed back to a model as a tool result.
    pub fn to_observation(&self) -> String {
        if self.successful {
            match &self.data {
                Value::String(s) => s.clone(),
                Value::Null => "OK".to_string(),
                other => other.to_string(),
            }
        } else {
            format!(
                "ERROR: {}",
                self.error.as_deref().unwrap_or("action failed without a message")
            )
        }
    }
}

/// Anything that can execute toolset actions.
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Execute `action` with JSON `params`.
    ///
    /// `Err` is reserved for transport-level failures; an action that ran and
    /// failed comes back as `Ok` with `successful == false`.
    async fn execute_action(
        &self,
        action: Action,
        params: Value,
    ) -> Result<ActionResponse, ToolsetError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_response_accepts_misspelled_flag() {
        let raw = r#"{"successfull": true, "data": {"patch": "diff"}, "error": null}"#;
        let resp: ActionResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.successful);
        assert_eq!(resp.data_str("patch"), Some("diff"));
    }

    #[test]
    fn test_action_response_defaults() {
        let resp: ActionResponse = serde_json::from_str("{}").unwrap();
        assert!(!resp.successful);
        assert!(resp.data.is_null());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_observation_text() {
        assert_eq!(ActionResponse::ok(json!("tree")).to_observation(), "tree");
        assert_eq!(ActionResponse::ok(Value::Null).to_observation(), "OK");
        assert_eq!(
            ActionResponse::ok(json!({"a": 1})).to_observation(),
            r#"{"a":1}"#
        );
        assert_eq!(
            ActionResponse::failed("no such dir").to_observation(),
            "ERROR: no such dir"
        );
    }
}
