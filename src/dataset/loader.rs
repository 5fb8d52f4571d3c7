//! SWE-bench instance loader.
//!
//! Rows come from the HuggingFace datasets-server rows API, paged 100 at a
//! time, or from a local JSON-lines export with the same columns.

use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{InstanceSelection, IssueConfig, TestRange};
use crate::error::DatasetError;

pub const DEFAULT_DATASET: &str = "princeton-nlp/SWE-bench_Verified";
pub const DEFAULT_SPLIT: &str = "test";

const HUGGINGFACE_ROWS_API: &str = "https://datasets-server.huggingface.co/rows";

/// Rows per request; the rows API refuses more.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct RowsResponse {
    rows: Vec<RowEnvelope>,
}

#[derive(Debug, Deserialize)]
struct RowEnvelope {
    row: SweBenchRow,
}

/// The columns this crate reads from a SWE-bench row.
#[derive(Debug, Deserialize)]
struct SweBenchRow {
    instance_id: String,
    repo: String,
    base_commit: String,
    #[serde(default)]
    problem_statement: String,
    #[serde(default)]
    hints_text: Option<String>,
}

impl SweBenchRow {
    fn into_issue(self, include_hints: bool) -> IssueConfig {
        IssueConfig {
            instance_id: self.instance_id,
            repo_name: self.repo,
            base_commit_id: self.base_commit,
            issue_desc: self.problem_statement,
            hints: if include_hints {
                self.hints_text.unwrap_or_default()
            } else {
                String::new()
            },
        }
    }
}

/// Loads [`IssueConfig`]s from a HuggingFace dataset or a local JSONL file.
pub struct SweBenchLoader {
    http_client: Client,
    dataset: String,
    split: String,
    include_hints: bool,
}

impl SweBenchLoader {
    /// `dataset` is a HuggingFace repo id or a path to a `.jsonl` file.
    pub fn new(dataset: impl Into<String>, split: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            dataset: dataset.into(),
            split: split.into(),
            include_hints: false,
        }
    }

    pub fn with_hints(mut self, include_hints: bool) -> Self {
        self.include_hints = include_hints;
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    fn is_local(&self) -> bool {
        self.dataset.ends_with(".jsonl") || Path::new(&self.dataset).is_file()
    }

    /// Load the rows covered by `selection` and apply its id filter.
    pub async fn load(&self, selection: &InstanceSelection) -> Result<Vec<IssueConfig>, DatasetError> {
        let rows = if self.is_local() {
            self.load_local(selection.range)?
        } else {
            self.fetch_range(selection.range).await?
        };
        tracing::info!(
            dataset = %self.dataset,
            split = %self.split,
            range = %selection.range,
            rows = rows.len(),
            "Loaded dataset rows"
        );
        selection.select(rows)
    }

    fn page_url(&self, offset: usize, length: usize) -> String {
        format!(
            "{}?dataset={}&config=default&split={}&offset={}&length={}",
            HUGGINGFACE_ROWS_API,
            urlencoding::encode(&self.dataset),
            urlencoding::encode(&self.split),
            offset,
            length
        )
    }

    async fn fetch_range(&self, range: TestRange) -> Result<Vec<IssueConfig>, DatasetError> {
        let mut issues = Vec::with_capacity(range.len());
        let mut offset = range.start;

        while offset < range.end {
            let length = (range.end - offset).min(PAGE_SIZE);
            let page = self.fetch_page(offset, length).await?;
            let fetched = page.len();
            issues.extend(page);
            if fetched < length {
                // Past the end of the split
                break;
            }
            offset += fetched;
        }

        Ok(issues)
    }

    async fn fetch_page(&self, offset: usize, length: usize) -> Result<Vec<IssueConfig>, DatasetError> {
        let response = self
            .http_client
            .get(self.page_url(offset, length))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| DatasetError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DatasetError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body: RowsResponse = response
            .json()
            .await
            .map_err(|e| DatasetError::ParseError(format!("Failed to parse response: {}", e)))?;

        Ok(body
            .rows
            .into_iter()
            .map(|r| r.row.into_issue(self.include_hints))
            .collect())
    }

    fn load_local(&self, range: TestRange) -> Result<Vec<IssueConfig>, DatasetError> {
        let content = std::fs::read_to_string(&self.dataset)
            .map_err(|e| DatasetError::RequestFailed(format!("{}: {}", self.dataset, e)))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .skip(range.start)
            .take(range.len())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str::<SweBenchRow>(line)
                    .map(|row| row.into_issue(self.include_hints))
                    .map_err(|e| {
                        DatasetError::ParseError(format!("row {}: {}", range.start + i, e))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn row(id: &str) -> String {
        serde_json::json!({
            "instance_id": id,
            "repo": "astropy/astropy",
            "base_commit": "deadbeef",
            "problem_statement": format!("issue {id}"),
            "hints_text": "try the parser",
            "FAIL_TO_PASS": "[]"
        })
        .to_string()
    }

    fn jsonl(ids: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        for id in ids {
            writeln!(file, "{}", row(id)).unwrap();
        }
        file
    }

    #[test]
    fn test_page_url_encodes_dataset() {
        let loader = SweBenchLoader::new(DEFAULT_DATASET, DEFAULT_SPLIT);
        assert_eq!(
            loader.page_url(100, 50),
            "https://datasets-server.huggingface.co/rows?dataset=princeton-nlp%2FSWE-bench_Verified&config=default&split=test&offset=100&length=50"
        );
    }

    #[test]
    fn test_rows_response_parsing() {
        let body = format!(r#"{{"rows": [{{"row_idx": 0, "row": {}}}]}}"#, row("a__1"));
        let parsed: RowsResponse = serde_json::from_str(&body).unwrap();
        let issue = parsed.rows.into_iter().next().unwrap().row.into_issue(false);
        assert_eq!(issue.instance_id, "a__1");
        assert_eq!(issue.repo_name, "astropy/astropy");
        assert_eq!(issue.base_commit_id, "deadbeef");
        assert!(issue.hints.is_empty());
    }

    #[tokio::test]
    async fn test_load_local_range() {
        let file = jsonl(&["a", "b", "c", "d"]);
        let loader = SweBenchLoader::new(file.path().to_string_lossy(), "test");
        let selection = InstanceSelection::from_args("1:3", "").unwrap();

        let issues = loader.load(&selection).await.unwrap();
        let ids: Vec<&str> = issues.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_load_local_by_instance_id_with_hints() {
        let file = jsonl(&["a", "b", "c"]);
        let loader = SweBenchLoader::new(file.path().to_string_lossy(), "test").with_hints(true);
        let selection = InstanceSelection::from_args("1:2", "c").unwrap();

        let issues = loader.load(&selection).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].instance_id, "c");
        assert_eq!(issues[0].hints, "try the parser");
    }

    #[test]
    fn test_load_local_reports_bad_row() {
        let mut file = jsonl(&["a"]);
        writeln!(file, "{{not json").unwrap();
        let loader = SweBenchLoader::new(file.path().to_string_lossy(), "test");
        let err = loader.load_local(TestRange { start: 0, end: 5 }).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
