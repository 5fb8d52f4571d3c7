//! Catalogue of the toolset actions agents are allowed to call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::ToolsetError;

/// A named toolset action.
///
/// Serialized with the platform's upper-snake identifiers, e.g.
/// `FILETOOL_GIT_PATCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    FiletoolChangeWorkingDirectory,
    FiletoolGitPatch,
    FiletoolGitRepoTree,
    ShelltoolExecCommand,
    BrowserToolGetPageDetails,
    BrowserToolGotoPage,
    BrowserToolScrollPage,
    BrowserToolRefreshPage,
    SlackSendsAMessageToASlackChannel,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::FiletoolChangeWorkingDirectory,
        Action::FiletoolGitPatch,
        Action::FiletoolGitRepoTree,
        Action::ShelltoolExecCommand,
        Action::BrowserToolGetPageDetails,
        Action::BrowserToolGotoPage,
        Action::BrowserToolScrollPage,
        Action::BrowserToolRefreshPage,
        Action::SlackSendsAMessageToASlackChannel,
    ];

    /// Actions the review bot's browser agent gets.
    pub const BROWSER_REVIEW: [Action; 5] = [
        Action::BrowserToolGetPageDetails,
        Action::BrowserToolGotoPage,
        Action::BrowserToolScrollPage,
        Action::BrowserToolRefreshPage,
        Action::SlackSendsAMessageToASlackChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::FiletoolChangeWorkingDirectory => "FILETOOL_CHANGE_WORKING_DIRECTORY",
            Action::FiletoolGitPatch => "FILETOOL_GIT_PATCH",
            Action::FiletoolGitRepoTree => "FILETOOL_GIT_REPO_TREE",
            Action::ShelltoolExecCommand => "SHELLTOOL_EXEC_COMMAND",
            Action::BrowserToolGetPageDetails => "BROWSER_TOOL_GET_PAGE_DETAILS",
            Action::BrowserToolGotoPage => "BROWSER_TOOL_GOTO_PAGE",
            Action::BrowserToolScrollPage => "BROWSER_TOOL_SCROLL_PAGE",
            Action::BrowserToolRefreshPage => "BROWSER_TOOL_REFRESH_PAGE",
            Action::SlackSendsAMessageToASlackChannel => "SLACK_SENDS_A_MESSAGE_TO_A_SLACK_CHANNEL",
        }
    }

    /// One-line description shown to the model.
    pub fn description(&self) -> &'static str {
        match self {
            Action::FiletoolChangeWorkingDirectory => "Change the current working directory.",
            Action::FiletoolGitPatch => {
                "Return the git patch (unified diff) of all changes in the current repository."
            }
            Action::FiletoolGitRepoTree => "Return the list of files tracked in the repository.",
            Action::ShelltoolExecCommand => "Run a shell command in the workspace.",
            Action::BrowserToolGetPageDetails => {
                "Get the URL, title and visible text of the current browser page."
            }
            Action::BrowserToolGotoPage => "Navigate the browser to a URL.",
            Action::BrowserToolScrollPage => "Scroll the current page up or down.",
            Action::BrowserToolRefreshPage => "Reload the current page.",
            Action::SlackSendsAMessageToASlackChannel => "Post a text message to a Slack channel.",
        }
    }

    /// JSON schema of the action's parameters.
    pub fn parameters(&self) -> Value {
        match self {
            Action::FiletoolChangeWorkingDirectory => json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
            Action::FiletoolGitPatch => json!({
                "type": "object",
                "properties": {"new_file_paths": {"type": "array", "items": {"type": "string"}}}
            }),
            Action::FiletoolGitRepoTree => json!({"type": "object", "properties": {}}),
            Action::ShelltoolExecCommand => json!({
                "type": "object",
                "properties": {"cmd": {"type": "string"}},
                "required": ["cmd"]
            }),
            Action::BrowserToolGetPageDetails | Action::BrowserToolRefreshPage => {
                json!({"type": "object", "properties": {}})
            }
            Action::BrowserToolGotoPage => json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
            Action::BrowserToolScrollPage => json!({
                "type": "object",
                "properties": {
                    "direction": {"type": "string", "enum": ["up", "down"]},
                    "amount": {"type": "integer"}
                }
            }),
            Action::SlackSendsAMessageToASlackChannel => json!({
                "type": "object",
                "properties": {
                    "channel": {"type": "string"},
                    "text": {"type": "string"}
                },
                "required": ["channel", "text"]
            }),
        }
    }

    /// Name of the app the action belongs to.
    pub fn app(&self) -> &'static str {
        match self {
            Action::FiletoolChangeWorkingDirectory
            | Action::FiletoolGitPatch
            | Action::FiletoolGitRepoTree => "filetool",
            Action::ShelltoolExecCommand => "shelltool",
            Action::BrowserToolGetPageDetails
            | Action::BrowserToolGotoPage
            | Action::BrowserToolScrollPage
            | Action::BrowserToolRefreshPage => "browsertool",
            Action::SlackSendsAMessageToASlackChannel => "slack",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ToolsetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ToolsetError::UnknownAction(wanted.to_string()))
    }
}

/// Read a required string parameter.
pub(crate) fn required_str<'a>(
    action: Action,
    params: &'a Value,
    key: &str,
) -> Result<&'a str, ToolsetError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolsetError::InvalidParams {
            action: action.to_string(),
            reason: format!("missing string field '{}'", key),
        })
}
