//! REST client for the hosted toolset platform.
//!
//! Covers action execution and trigger management. Authentication is a
//! single `x-api-key` header.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{Action, ActionResponse, Toolset};
use crate::error::ToolsetError;

/// Default platform endpoint.
pub const DEFAULT_TOOLSET_BASE_URL: &str = "https://backend.composio.dev";

/// Entity used when none is configured.
const DEFAULT_ENTITY_ID: &str = "default";

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A trigger type offered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    #[serde(rename = "appName", default)]
    pub app_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

/// Status returned by trigger setup/enable/disable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerStatus {
    pub status: String,
    #[serde(rename = "triggerId", default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
}

impl TriggerStatus {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerList {
    Items { items: Vec<TriggerInfo> },
    Bare(Vec<TriggerInfo>),
}

/// Client for the hosted toolset API.
pub struct HttpToolset {
    base_url: String,
    api_key: String,
    entity_id: String,
    connected_account_id: Option<String>,
    client: Client,
}

impl HttpToolset {
    pub fn new(api_key: String) -> Self {
        Self {
            base_url: DEFAULT_TOOLSET_BASE_URL.to_string(),
            api_key,
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            connected_account_id: None,
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Build a client from `SWEVOTE_TOOLSET_API_KEY` (or `COMPOSIO_API_KEY`)
    /// and the optional `SWEVOTE_TOOLSET_BASE_URL`.
    pub fn from_env() -> Result<Self, ToolsetError> {
        let api_key = std::env::var("SWEVOTE_TOOLSET_API_KEY")
            .or_else(|_| std::env::var("COMPOSIO_API_KEY"))
            .map_err(|_| ToolsetError::MissingApiKey)?;
        let mut toolset = Self::new(api_key);
        if let Ok(base) = std::env::var("SWEVOTE_TOOLSET_BASE_URL") {
            toolset = toolset.with_base_url(base);
        }
        Ok(toolset)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = entity_id.into();
        self
    }

    pub fn with_connected_account(mut self, id: impl Into<String>) -> Self {
        self.connected_account_id = Some(id.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API key with everything but the ends hidden, for logs.
    pub fn api_key_masked(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 8 {
            "*".repeat(chars.len())
        } else {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
    }

    fn action_url(&self, action: Action) -> String {
        format!("{}/api/v2/actions/{}/execute", self.base_url, action.as_str())
    }

    fn action_body(&self, action: Action, params: Value) -> Value {
        let mut body = json!({
            "entityId": self.entity_id,
            "appName": action.app(),
            "input": params,
        });
        if let Some(ref id) = self.connected_account_id {
            body["connectedAccountId"] = Value::String(id.clone());
        }
        body
    }

    fn triggers_url(&self, app_names: &[String]) -> String {
        let mut url = format!("{}/api/v1/triggers", self.base_url);
        if !app_names.is_empty() {
            let joined = app_names.join(",");
            url.push_str("?appNames=");
            url.push_str(&urlencoding::encode(&joined));
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ToolsetError> {
        let response = request
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ToolsetError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(ToolsetError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolsetError::ParseError(e.to_string()))
    }

    /// List available triggers, optionally restricted to some apps.
    pub async fn list_triggers(
        &self,
        app_names: &[String],
    ) -> Result<Vec<TriggerInfo>, ToolsetError> {
        let body = self
            .send(self.client.get(self.triggers_url(app_names)))
            .await?;
        let list: TriggerList = serde_json::from_value(body)?;
        Ok(match list {
            TriggerList::Items { items } => items,
            TriggerList::Bare(items) => items,
        })
    }

    /// Create a trigger instance for a connected account.
    pub async fn setup_trigger(
        &self,
        connected_account_id: &str,
        trigger_name: &str,
        config: Value,
    ) -> Result<TriggerStatus, ToolsetError> {
        let url = format!(
            "{}/api/v1/triggers/enable/{}/{}",
            self.base_url,
            urlencoding::encode(connected_account_id),
            urlencoding::encode(trigger_name)
        );
        let body = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "triggerConfig": config })),
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn enable_trigger(&self, trigger_id: &str) -> Result<TriggerStatus, ToolsetError> {
        self.set_trigger_enabled(trigger_id, true).await
    }

    pub async fn disable_trigger(&self, trigger_id: &str) -> Result<TriggerStatus, ToolsetError> {
        self.set_trigger_enabled(trigger_id, false).await
    }

    async fn set_trigger_enabled(
        &self,
        trigger_id: &str,
        enabled: bool,
    ) -> Result<TriggerStatus, ToolsetError> {
        let url = format!(
            "{}/api/v1/triggers/instance/{}/status",
            self.base_url,
            urlencoding::encode(trigger_id)
        );
        let body = self
            .send(self.client.patch(url).json(&json!({ "enabled": enabled })))
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl Toolset for HttpToolset {
    async fn execute_action(
        &self,
        action: Action,
        params: Value,
    ) -> Result<ActionResponse, ToolsetError> {
        tracing::debug!(action = %action, entity = %self.entity_id, "Executing hosted action");
        let body = self
            .send(
                self.client
                    .post(self.action_url(action))
                    .json(&self.action_body(action, params)),
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let toolset = HttpToolset::new("key".to_string()).with_base_url("http://localhost:9000/");
        assert_eq!(
            toolset.action_url(Action::FiletoolGitPatch),
            "http://localhost:9000/api/v2/actions/FILETOOL_GIT_PATCH/execute"
        );
        assert_eq!(
            toolset.triggers_url(&[]),
            "http://localhost:9000/api/v1/triggers"
        );
        assert_eq!(
            toolset.triggers_url(&["slack".to_string(), "github".to_string()]),
            "http://localhost:9000/api/v1/triggers?appNames=slack%2Cgithub"
        );
    }

    #[test]
    fn test_action_body() {
        let toolset = HttpToolset::new("key".to_string())
            .with_entity_id("bot")
            .with_connected_account("ca_1");
        let body = toolset.action_body(
            Action::SlackSendsAMessageToASlackChannel,
            json!({"channel": "C1", "text": "hi"}),
        );
        assert_eq!(body["entityId"], "bot");
        assert_eq!(body["appName"], "slack");
        assert_eq!(body["input"]["channel"], "C1");
        assert_eq!(body["connectedAccountId"], "ca_1");
    }

    #[test]
    fn test_api_key_masked() {
        assert_eq!(HttpToolset::new("short".to_string()).api_key_masked(), "*****");
        assert_eq!(
            HttpToolset::new("abcd1234wxyz".to_string()).api_key_masked(),
            "abcd...wxyz"
        );
        assert_eq!(
            HttpToolset::new("ключ-секрет-9876".to_string()).api_key_masked(),
            "ключ...9876"
        );
        assert_eq!(HttpToolset::new("пароль".to_string()).api_key_masked(), "******");
    }

    #[test]
    fn test_trigger_list_shapes() {
        let wrapped: TriggerList = serde_json::from_value(json!({
            "items": [{"name": "slack_receive_message", "appName": "slack"}]
        }))
        .unwrap();
        let bare: TriggerList =
            serde_json::from_value(json!([{"name": "github_issue_added_event"}])).unwrap();
        assert!(matches!(wrapped, TriggerList::Items { ref items } if items[0].app_name == "slack"));
        assert!(matches!(bare, TriggerList::Bare(ref items) if items.len() == 1));
    }

    #[test]
    fn test_trigger_status() {
        let status: TriggerStatus =
            serde_json::from_value(json!({"status": "success", "triggerId": "t_1"})).unwrap();
        assert!(status.is_success());
        assert_eq!(status.trigger_id.as_deref(), Some("t_1"));
    }

    #[tokio::test]
    async fn test_execute_connection_error() {
        let toolset = HttpToolset::new("key".to_string()).with_base_url("http://localhost:65535");
        let result = toolset
            .execute_action(Action::BrowserToolRefreshPage, json!({}))
            .await;
        assert!(matches!(result, Err(ToolsetError::RequestFailed(_))));
    }
}
