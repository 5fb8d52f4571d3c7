//! Benchmark instances and how a run selects them.
//!
//! A run picks a half-open row range of the dataset split (`--test-split`,
//! e.g. `1:2`), optionally narrowed to explicit instance ids
//! (`--test-instance-ids`). When ids are given the range widens to
//! `0:500` so the ids can be found anywhere in the first 500 rows.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DatasetError;

pub use loader::{SweBenchLoader, DEFAULT_DATASET, DEFAULT_SPLIT};

/// Largest number of rows a single range may cover.
pub const MAX_TEST_RANGE: usize = 500;

/// One issue to solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueConfig {
    pub instance_id: String,
    /// `owner/repo`.
    pub repo_name: String,
    pub base_commit_id: String,
    pub issue_desc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hints: String,
}

impl IssueConfig {
    /// Last path segment of the repository name.
    pub fn repo_short_name(&self) -> &str {
        self.repo_name.rsplit('/').next().unwrap_or(&self.repo_name)
    }

    /// Issue text shown to agents and the judge, with hints appended when
    /// the dataset supplied any.
    pub fn description(&self) -> String {
        if self.hints.trim().is_empty() {
            self.issue_desc.clone()
        } else {
            format!("{}\n\nHints:\n{}", self.issue_desc, self.hints.trim())
        }
    }
}

/// Half-open row range `start:end` within a dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRange {
    pub start: usize,
    pub end: usize,
}

impl TestRange {
    /// The range used when explicit instance ids are requested.
    pub fn widest() -> Self {
        Self {
            start: 0,
            end: MAX_TEST_RANGE,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Default for TestRange {
    fn default() -> Self {
        Self { start: 1, end: 2 }
    }
}

impl fmt::Display for TestRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for TestRange {
    type Err = DatasetError;

    /// Parse `start:end`. An empty start means 0; an empty end means
    /// `start + 500`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DatasetError::InvalidSplit(s.to_string());
        let (start, end) = s.trim().split_once(':').ok_or_else(invalid)?;

        let start: usize = if start.trim().is_empty() {
            0
        } else {
            start.trim().parse().map_err(|_| invalid())?
        };
        let end: usize = if end.trim().is_empty() {
            start.checked_add(MAX_TEST_RANGE).ok_or_else(invalid)?
        } else {
            end.trim().parse().map_err(|_| invalid())?
        };

        if end <= start || end - start > MAX_TEST_RANGE {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

/// Which instances a run evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSelection {
    pub range: TestRange,
    pub instance_ids: Vec<String>,
}

impl InstanceSelection {
    /// Build from the raw `--test-split` and `--test-instance-ids` values.
    pub fn from_args(test_split: &str, test_instance_ids: &str) -> Result<Self, DatasetError> {
        let instance_ids: Vec<String> = test_instance_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        let range = if instance_ids.is_empty() {
            test_split.parse()?
        } else {
            TestRange::widest()
        };

        Ok(Self {
            range,
            instance_ids,
        })
    }

    /// Keep only the requested ids (all issues when none were requested).
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::InstanceNotFound` for the first requested id
    /// missing from `issues`.
    pub fn select(&self, issues: Vec<IssueConfig>) -> Result<Vec<IssueConfig>, DatasetError> {
        if self.instance_ids.is_empty() {
            return Ok(issues);
        }
        if let Some(missing) = self
            .instance_ids
            .iter()
            .find(|id| !issues.iter().any(|issue| &issue.instance_id == *id))
        {
            return Err(DatasetError::InstanceNotFound(missing.clone()));
        }
        Ok(issues
            .into_iter()
            .filter(|issue| self.instance_ids.contains(&issue.instance_id))
            .collect())
    }
}
