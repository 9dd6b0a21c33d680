use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("query selects no measures and no dimensions")]
    Empty,
    #[error("time dimension '{0}' has an empty date range")]
    EmptyDateRange(String),
    #[error("failed to encode query: {0}")]
    Encode(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

/// Either an explicit `[from, to]` pair or a relative phrase like `"last 7 days"`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DateRange {
    Between([String; 2]),
    Relative(String),
}

impl DateRange {
    fn is_empty(&self) -> bool {
        match self {
            DateRange::Between([from, to]) => from.is_empty() || to.is_empty(),
            DateRange::Relative(phrase) => phrase.trim().is_empty(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeDimension {
    pub dimension: String,
    pub date_range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

impl TimeDimension {
    /// Name of the column the API returns for this time dimension.
    pub fn output_member(&self) -> Option<String> {
        self.granularity
            .map(|g| format!("{}.{}", self.dimension, g.as_str()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Gt,
    Gte,
    Lt,
    Lte,
    Set,
    NotSet,
    InDateRange,
    NotInDateRange,
    BeforeDate,
    AfterDate,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Filter {
    pub member: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub measures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_dimensions: Vec<TimeDimension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Query {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.measures.is_empty() && self.dimensions.is_empty() {
            return Err(QueryError::Empty);
        }
        if let Some(td) = self.time_dimensions.iter().find(|td| td.date_range.is_empty()) {
            return Err(QueryError::EmptyDateRange(td.dimension.clone()));
        }
        Ok(())
    }

    /// JSON text sent as the `query` parameter of `/load`.
    pub fn to_param(&self) -> Result<String, QueryError> {
        serde_json::to_string(self).map_err(|e| QueryError::Encode(e.to_string()))
    }

    /// Members the result rows are expected to carry: dimensions and
    /// granular time dimensions first, then measures.
    pub fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self.dimensions.clone();
        members.extend(self.time_dimensions.iter().filter_map(|td| td.output_member()));
        members.extend(self.measures.iter().cloned());
        members
    }
}
