use crate::expect::Expectation;
use crate::format::TableSpec;
use crate::query::{Query, QueryError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Suite compiled into the binary: the twelve-month high-risk metric checks.
pub const BUILTIN_SUITE: &str = include_str!("../suites/high_risk_metrics.toml");

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read suite file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse suite: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("suite has no cases")]
    Empty,
    #[error("case #{0} has an empty id")]
    MissingId(usize),
    #[error("duplicate case id '{0}'")]
    DuplicateId(String),
    #[error("case '{id}': {source}")]
    Query { id: String, source: QueryError },
    #[error("case '{id}': {reason}")]
    Invalid { id: String, reason: String },
    #[error("no case with id '{0}'")]
    UnknownCase(String),
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SuiteMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: Query,
    #[serde(default)]
    pub table: Option<TableSpec>,
    #[serde(default, rename = "expect")]
    pub expectations: Vec<Expectation>,
}

impl TestCase {
    pub fn new(id: &str, name: &str, query: Query) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            query,
            table: None,
            expectations: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Suite {
    pub suite: SuiteMeta,
    #[serde(default, rename = "case")]
    pub cases: Vec<TestCase>,
}

impl Suite {
    pub fn from_toml(content: &str) -> Result<Self, SuiteError> {
        let suite: Suite = toml::from_str(content)?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn from_file(path: &Path) -> Result<Self, SuiteError> {
        let content = std::fs::read_to_string(path).map_err(|source| SuiteError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn builtin() -> Result<Self, SuiteError> {
        Self::from_toml(BUILTIN_SUITE)
    }

    fn validate(&self) -> Result<(), SuiteError> {
        if self.cases.is_empty() {
            return Err(SuiteError::Empty);
        }
        let mut seen = HashSet::new();
        for (index, case) in self.cases.iter().enumerate() {
            if case.id.trim().is_empty() {
                return Err(SuiteError::MissingId(index + 1));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(SuiteError::DuplicateId(case.id.clone()));
            }
            case.query.validate().map_err(|source| SuiteError::Query {
                id: case.id.clone(),
                source,
            })?;
            if let Some(table) = &case.table {
                for column in &table.columns {
                    column.source().map_err(|reason| SuiteError::Invalid {
                        id: case.id.clone(),
                        reason,
                    })?;
                }
            }
            for expectation in &case.expectations {
                expectation.validate().map_err(|reason| SuiteError::Invalid {
                    id: case.id.clone(),
                    reason,
                })?;
            }
        }
        Ok(())
    }

    /// Keeps only the named cases, in the order the suite lists them.
    pub fn select(mut self, ids: &[String]) -> Result<Self, SuiteError> {
        if ids.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = ids.iter().find(|id| !self.cases.iter().any(|c| &c.id == *id)) {
            return Err(SuiteError::UnknownCase(unknown.clone()));
        }
        self.cases.retain(|c| ids.contains(&c.id));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [suite]
        name = "fulfilled orders"
        timeout_secs = 10

        [[case]]
        id = "OM002"
        name = "Fulfilled orders, January 2025"
        query = { measures = ["transactions.fulfilled_orders"] }

        [[case.expect]]
        field = "transactions.fulfilled_orders"
        equals = 13359

        [[case]]
        id = "OM002_WEEKLY"
        name = "Weekly breakdown"

        [case.query]
        measures = ["transactions.fulfilled_orders"]
        timeDimensions = [{ dimension = "transactions.trandate", dateRange = ["2025-01-01", "2025-01-31"], granularity = "week" }]
    "#;

    #[test]
    fn parses_cases_with_expectations() {
        let suite = Suite::from_toml(MINIMAL).unwrap();
        assert_eq!(suite.suite.timeout_secs, Some(10));
        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.cases[0].expectations.len(), 1);
        assert!(suite.cases[1].expectations.is_empty());
        assert_eq!(
            suite.cases[1].query.members(),
            vec!["transactions.trandate.week", "transactions.fulfilled_orders"]
        );
    }

    #[test]
    fn builtin_suite_is_valid() {
        let suite = Suite::builtin().unwrap();
        assert_eq!(suite.cases.len(), 8);
        assert_eq!(suite.cases[0].id, "MM001");
        assert_eq!(suite.cases[7].id, "COGS_DIRECT");
    }

    #[test]
    fn shipped_suites_are_valid() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("suites");
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if let Err(e) = Suite::from_file(&path) {
                panic!("{}: {e}", path.display());
            }
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let doubled = format!(
            "{MINIMAL}\n[[case]]\nid = \"OM002\"\nname = \"again\"\nquery = {{ measures = [\"a.b\"] }}\n"
        );
        assert!(matches!(
            Suite::from_toml(&doubled),
            Err(SuiteError::DuplicateId(id)) if id == "OM002"
        ));
    }

    #[test]
    fn empty_query_is_rejected() {
        let text = "[suite]\nname = \"x\"\n[[case]]\nid = \"A\"\nname = \"a\"\nquery = {}\n";
        assert!(matches!(
            Suite::from_toml(text),
            Err(SuiteError::Query { source: QueryError::Empty, .. })
        ));
    }

    #[test]
    fn select_filters_and_reports_unknown_ids() {
        let suite = Suite::from_toml(MINIMAL).unwrap();
        let picked = suite.clone().select(&["OM002_WEEKLY".to_string()]).unwrap();
        assert_eq!(picked.cases.len(), 1);
        assert!(matches!(
            suite.select(&["NOPE".to_string()]),
            Err(SuiteError::UnknownCase(_))
        ));
    }
}
