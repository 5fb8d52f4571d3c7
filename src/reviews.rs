//! Slack-triggered product review summarizer.
//!
//! A message posted in the watched channel is taken as a product URL. The
//! bot acknowledges it, then walks a browser agent through a fixed list of
//! tasks ending with a review summary posted back to the channel.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::agent::{ExecutorConfig, ToolAgentExecutor};
use crate::config::ReviewConfig;
use crate::error::ToolsetError;
use crate::llm::LlmProvider;
use crate::toolset::{Action, ActionResponse, Toolset, TriggerEvent, TriggerFilter, TriggerListener};

/// Posted to the channel before the review tasks start.
pub const ACK_MESSAGE: &str = "Collating responses using the composio browser tool.......";

/// The browser tasks for `url`, in order.
pub fn review_tasks(url: &str, channel_id: &str) -> Vec<String> {
    vec![
        format!("Go to {}", url),
        "Wait for the page to fully load and verify the content is accessible".to_string(),
        "scroll down the page".to_string(),
        "Locate the customer reviews".to_string(),
        "Keep repeating the process till you find all the reviews".to_string(),
        format!(
            "Analyze all customer reviews on the page and provide a concise summary that includes: \
             \n- Overall rating and total number of reviews \
             \n- Key positive points mentioned frequently \
             \n- Common complaints or issues \
             \n- Notable specific feedback about product features \
             \nKeep the summary focused on helping potential buyers make an informed decision.\
             Format the summary and send the summary to the slack channel with id {}",
            channel_id
        ),
    ]
}

/// Slack wraps links as `<https://url>` or `<https://url|label>`.
pub fn unwrap_slack_link(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        Some(inner) => inner.split('|').next().unwrap_or(inner),
        None => trimmed,
    }
}

/// Outcome of one review task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Handles Slack messages for one channel.
pub struct ReviewBot {
    toolset: Arc<dyn Toolset>,
    executor: ToolAgentExecutor,
    channel_id: String,
}

impl ReviewBot {
    pub fn new(toolset: Arc<dyn Toolset>, llm: Arc<dyn LlmProvider>, config: &ReviewConfig) -> Self {
        let executor = ToolAgentExecutor::new(
            llm,
            toolset.clone(),
            Action::BROWSER_REVIEW,
            ExecutorConfig::default()
                .with_model(config.model.clone())
                .with_max_steps(config.max_steps),
        );
        Self {
            toolset,
            executor,
            channel_id: config.channel_id.clone(),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    async fn send_message(&self, text: &str) -> Result<ActionResponse, ToolsetError> {
        self.toolset
            .execute_action(
                Action::SlackSendsAMessageToASlackChannel,
                json!({ "channel": self.channel_id, "text": text }),
            )
            .await
    }

    /// React to one `slack_receive_message` event.
    ///
    /// Returns `None` for messages from other channels; otherwise the
    /// reports of the review tasks.
    pub async fn handle_message(&self, event: &TriggerEvent) -> Option<Vec<TaskReport>> {
        let message = event.payload_str("text");
        let channel = event.payload_str("channel");
        if channel != self.channel_id {
            tracing::debug!(channel = channel, "Ignoring message from another channel");
            return None;
        }
        tracing::info!(channel = channel, message = message, "Received review request");

        match self.send_message(ACK_MESSAGE).await {
            Ok(response) if !response.successful => {
                tracing::warn!(error = ?response.error, "Slack rejected acknowledgement");
            }
            Ok(_) => tracing::info!(channel = channel, "Acknowledgement sent"),
            Err(e) => tracing::warn!(error = %e, "Failed to send acknowledgement"),
        }

        Some(self.get_reviews(unwrap_slack_link(message)).await)
    }

    /// Run the review tasks for `url` one after another. A failing task is
    /// logged and the rest still run.
    pub async fn get_reviews(&self, url: &str) -> Vec<TaskReport> {
        let mut reports = Vec::new();
        for task in review_tasks(url, &self.channel_id) {
            let report = match self.executor.invoke(&task).await {
                Ok(outcome) => {
                    tracing::info!(task = %task, steps = outcome.steps.len(), result = %outcome.output, "Task finished");
                    TaskReport {
                        task,
                        output: Some(outcome.output),
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(task = %task, error = %e, "Error executing task");
                    TaskReport {
                        task,
                        output: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }

    /// Register the bot on `listener` for `trigger_name` events.
    pub fn register(self: Arc<Self>, listener: &mut TriggerListener, trigger_name: &str) {
        listener.callback(TriggerFilter::trigger_name(trigger_name), move |event| {
            let bot = self.clone();
            async move {
                bot.handle_message(&event).await;
            }
        });
    }
}
