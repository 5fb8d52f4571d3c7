//! In-memory toolset for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{Action, ActionResponse, Toolset};
use crate::error::ToolsetError;

/// Answers each action with a canned response and records every call.
#[derive(Default)]
pub struct RecordingToolset {
    responses: Mutex<HashMap<Action, Vec<ActionResponse>>>,
    calls: Mutex<Vec<(Action, Value)>>,
}

impl RecordingToolset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `action`. The last queued response repeats.
    pub fn respond(self, action: Action, response: ActionResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(action)
            .or_default()
            .push(response);
        self
    }

    pub fn calls(&self) -> Vec<(Action, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, action: Action) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl Toolset for RecordingToolset {
    async fn execute_action(
        &self,
        action: Action,
        params: Value,
    ) -> Result<ActionResponse, ToolsetError> {
        self.calls.lock().unwrap().push((action, params));
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.entry(action).or_default();
        let response = match queue.len() {
            0 => ActionResponse::ok(Value::Null),
            1 => queue[0].clone(),
            _ => queue.remove(0),
        };
        Ok(response)
    }
}
