use crate::harness::{Summary, TestRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub summary: Summary,
    pub results: Vec<TestRecord>,
}

impl Report {
    pub fn new(suite: Option<&str>, results: Vec<TestRecord>) -> Self {
        Self {
            timestamp: Local::now(),
            suite: suite.map(str::to_string),
            summary: Summary::from_records(&results),
            results,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("failed to create report directory")?;
        }
        let mut encoded = serde_json::to_vec_pretty(self).context("failed to encode report json")?;
        encoded.push(b'\n');
        std::fs::write(path, encoded)
            .with_context(|| format!("failed to write report {}", path.display()))
    }
}
