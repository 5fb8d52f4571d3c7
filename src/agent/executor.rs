//! JSON tool-call agent loop over a restricted set of toolset actions.
//!
//! Each step:
//! 1. ask the model for the next move
//! 2. parse a `{"tool", "arguments"}` call or a `{"final_answer"}` reply
//! 3. execute the action and feed the observation back
//!
//! A reply with no JSON at all is taken as the final answer. Tool failures
//! and unknown tools become observations so the model can correct itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::toolset::{Action, Toolset};
use crate::utils::{extract_json_object, truncate};

/// Longest observation fed back to the model.
const MAX_OBSERVATION_CHARS: usize = 8000;

/// Configuration for the executor loop.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub model: String,
    pub max_steps: usize,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_steps: 15,
            temperature: 0.0,
            max_tokens: 2048,
        }
    }
}

impl ExecutorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// A tool call extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// One turn of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStep {
    pub step: usize,
    pub response: String,
    pub tool_call: Option<ToolCall>,
    pub observation: Option<String>,
}

/// Result of running one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorOutcome {
    pub output: String,
    pub steps: Vec<ExecutorStep>,
}

#[derive(Debug, PartialEq)]
enum Reply {
    Tool(ToolCall),
    Final(String),
}

fn parse_reply(text: &str) -> Reply {
    let Some(value) = extract_json_object(text) else {
        return Reply::Final(text.trim().to_string());
    };

    if let Some(answer) = value.get("final_answer") {
        let answer = match answer {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Reply::Final(answer);
    }

    let name = ["tool", "action", "name"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str));
    match name {
        Some(name) => {
            let arguments = ["arguments", "parameters", "params"]
                .iter()
                .find_map(|key| value.get(*key).cloned())
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            Reply::Tool(ToolCall {
                name: name.to_string(),
                arguments,
            })
        }
        None => Reply::Final(text.trim().to_string()),
    }
}

/// Runs tasks by letting a model call toolset actions.
pub struct ToolAgentExecutor {
    llm: Arc<dyn LlmProvider>,
    toolset: Arc<dyn Toolset>,
    actions: Vec<Action>,
    config: ExecutorConfig,
}

impl ToolAgentExecutor {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        toolset: Arc<dyn Toolset>,
        actions: impl Into<Vec<Action>>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            llm,
            toolset,
            actions: actions.into(),
            config,
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    fn system_prompt(&self) -> String {
        let tools: Vec<Value> = self
            .actions
            .iter()
            .map(|action| {
                serde_json::json!({
                    "name": action.as_str(),
                    "description": action.description(),
                    "parameters": action.parameters(),
                })
            })
            .collect();

        format!(
            "You are a helpful assistant that completes tasks using tools.\n\n\
             Tools:\n{}\n\n\
             To call a tool, reply with only a JSON object: \
             {{\"tool\": \"<TOOL NAME>\", \"arguments\": {{...}}}}\n\
             When the task is done, reply with: {{\"final_answer\": \"<your answer>\"}}",
            serde_json::to_string_pretty(&tools).unwrap_or_default()
        )
    }

    async fn observe(&self, call: &ToolCall) -> String {
        let action = match call.name.parse::<Action>() {
            Ok(action) if self.actions.contains(&action) => action,
            _ => {
                return format!(
                    "ERROR: tool '{}' is not available. Use one of: {}",
                    call.name,
                    self.actions
                        .iter()
                        .map(Action::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        };

        match self
            .toolset
            .execute_action(action, call.arguments.clone())
            .await
        {
            Ok(response) => response.to_observation(),
            Err(e) => format!("ERROR: {}", e),
        }
    }

    /// Run `task` to completion.
    ///
    /// # Errors
    ///
    /// `AgentError::RecursionLimit` when `max_steps` replies produced no
    /// final answer; `AgentError::Llm` when the model call fails.
    pub async fn invoke(&self, task: &str) -> Result<ExecutorOutcome, AgentError> {
        let mut conversation = vec![
            Message::system(self.system_prompt()),
            Message::user(task),
        ];
        let mut steps = Vec::new();

        for step in 0..self.config.max_steps {
            let request = GenerationRequest::new(self.config.model.clone(), conversation.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);
            let response = self.llm.generate(request).await?;
            let text = response.first_content().unwrap_or_default().to_string();
            conversation.push(Message::assistant(&text));

            match parse_reply(&text) {
                Reply::Final(output) => {
                    tracing::debug!(step = step, "Executor finished task");
                    steps.push(ExecutorStep {
                        step,
                        response: text,
                        tool_call: None,
                        observation: None,
                    });
                    return Ok(ExecutorOutcome { output, steps });
                }
                Reply::Tool(call) => {
                    let observation = truncate(&self.observe(&call).await, MAX_OBSERVATION_CHARS);
                    tracing::debug!(step = step, tool = %call.name, "Executor called tool");
                    conversation.push(Message::user(format!(
                        "Observation from {}:\n{}",
                        call.name, observation
                    )));
                    steps.push(ExecutorStep {
                        step,
                        response: text,
                        tool_call: Some(call),
                        observation: Some(observation),
                    });
                }
            }
        }

        Err(AgentError::RecursionLimit {
            limit: self.config.max_steps,
        })
    }
}
