//! Checks of returned rows against recorded values.
//!
//! An expectation picks one number out of the result (a row by index, the
//! first row matching a set of labels, or the sum over every row) and
//! compares it with what was confirmed correct earlier, or with other fields
//! of the same row. With `each = true` the check runs on every matching row.

use crate::api::Row;
use crate::format::{group_thousands, label, numeric};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    Row,
    Sum,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Expectation {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub row: Option<usize>,
    #[serde(default, rename = "where")]
    pub matching: BTreeMap<String, String>,
    /// Like `where`, but the label only has to contain the text.
    #[serde(default)]
    pub where_contains: BTreeMap<String, String>,
    /// Check every selected row instead of the first one.
    #[serde(default)]
    pub each: bool,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default)]
    pub equals: Option<f64>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Values known to be wrong, e.g. the figure before a fix landed.
    #[serde(default)]
    pub reject: Vec<f64>,
    #[serde(default)]
    pub sum_of: Vec<String>,
    /// The value must equal `numerator / denominator` of the same row.
    #[serde(default)]
    pub ratio_of: Option<[String; 2]>,
    /// The value must be lower than this field of the same row.
    #[serde(default)]
    pub below_field: Option<String>,
    #[serde(default)]
    pub min_rows: Option<usize>,
    /// Compare the value as a percentage of the field's total over all rows.
    #[serde(default)]
    pub share: bool,
    /// A `where` that matches no row passes instead of failing.
    #[serde(default)]
    pub absent_ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    pub fn marker(&self) -> &'static str {
        match self {
            Verdict::Pass => "✅ PASS",
            Verdict::Warn => "⚠️  UNEXPECTED",
            Verdict::Fail => "❌ FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub verdict: Verdict,
    pub message: String,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.verdict.marker(), self.message)
    }
}

impl Expectation {
    /// A fixture must name a field unless it only counts rows.
    pub fn validate(&self) -> Result<(), String> {
        if self.field.is_none() && self.min_rows.is_none() {
            return Err("expectation needs `field` or `min_rows`".into());
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(format!("expectation range is inverted ({min} > {max})"));
            }
        }
        if self.share && (self.aggregate == Aggregate::Sum || !self.sum_of.is_empty()) {
            return Err("`share` only applies to a single selected row".into());
        }
        if self.filtered() && self.aggregate == Aggregate::Sum {
            return Err("`where` cannot be combined with `aggregate = \"sum\"`".into());
        }
        let relational = self.ratio_of.is_some() || self.below_field.is_some();
        if (relational || self.each) && (self.aggregate == Aggregate::Sum || self.share) {
            return Err(
                "`each`, `ratio_of` and `below_field` need plain row values (no sum or share)"
                    .into(),
            );
        }
        if !self.sum_of.is_empty() && self.aggregate == Aggregate::Sum {
            return Err("`sum_of` compares fields of a single row".into());
        }
        if self.each && self.field.is_none() {
            return Err("`each` needs a `field`".into());
        }
        Ok(())
    }

    fn filtered(&self) -> bool {
        !self.matching.is_empty() || !self.where_contains.is_empty()
    }

    fn matches(&self, row: &Row) -> bool {
        self.matching.iter().all(|(f, v)| label(row, f) == *v)
            && self
                .where_contains
                .iter()
                .all(|(f, v)| label(row, f).contains(v.as_str()))
    }

    fn name(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.field.clone())
            .unwrap_or_else(|| "row count".into())
    }

    pub fn check(&self, rows: &[Row]) -> CheckResult {
        let name = self.name();

        if let Some(min_rows) = self.min_rows {
            if rows.len() < min_rows {
                return fail(format!(
                    "{name}: expected at least {min_rows} rows, got {}",
                    rows.len()
                ));
            }
            if self.field.is_none() {
                return pass(format!("{name}: {} rows", rows.len()));
            }
        }
        let Some(field) = self.field.as_deref() else {
            return fail(format!("{name}: no field to check"));
        };

        if self.each {
            return self.check_each(rows, &name, field);
        }
        if self.absent_ok && self.filtered() && self.pick_row(rows).is_err() {
            return pass(format!("{name}: no matching row"));
        }
        let value = match self.select(rows, field) {
            Ok(value) => value,
            Err(reason) => return fail(format!("{name}: {reason}")),
        };
        let row = match self.aggregate {
            Aggregate::Row => self.pick_row(rows).ok(),
            Aggregate::Sum => None,
        };

        if !self.sum_of.is_empty() {
            return match row {
                Some(row) => self.sum_in_row(row, &name, value),
                None => fail(format!("{name}: `sum_of` needs a single row")),
            };
        }
        self.compare(&name, value, row)
    }

    /// Runs the comparison on every selected row; the first problem wins.
    fn check_each(&self, rows: &[Row], name: &str, field: &str) -> CheckResult {
        let selected: Vec<(usize, &Row)> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.matches(row))
            .collect();
        if selected.is_empty() {
            return if self.absent_ok {
                pass(format!("{name}: no matching row"))
            } else if rows.is_empty() {
                fail(format!("{name}: no data returned"))
            } else {
                fail(format!("{name}: no row matches"))
            };
        }

        for &(index, row) in &selected {
            // A filtered-out average comes back as null; count it as zero.
            let value = match row.get(field) {
                Some(Value::Null) => Some(0.0),
                _ => numeric(row, field),
            };
            let row_name = format!("{name} [{}]", self.describe(index, row));
            let Some(value) = value else {
                return fail(format!("{row_name}: field '{field}' missing or not numeric"));
            };
            let result = if self.sum_of.is_empty() {
                self.compare(&row_name, value, Some(row))
            } else {
                self.sum_in_row(row, &row_name, value)
            };
            if result.verdict != Verdict::Pass {
                return result;
            }
        }
        pass(format!("{name}: all {} rows ok", selected.len()))
    }

    fn describe(&self, index: usize, row: &Row) -> String {
        let labels: Vec<String> = self
            .matching
            .keys()
            .chain(self.where_contains.keys())
            .map(|f| label(row, f))
            .collect();
        if labels.is_empty() {
            format!("row {index}")
        } else {
            labels.join(", ")
        }
    }

    fn compare(&self, name: &str, value: f64, row: Option<&Row>) -> CheckResult {
        let shown = if self.share {
            format!("{value:.2}%")
        } else {
            display(value)
        };

        if self.reject.iter().any(|bad| approx_eq(*bad, value, 0.0)) {
            return fail(format!("{name}: still showing known-bad value {shown}"));
        }

        let tolerance = self.tolerance.unwrap_or(0.0);
        let mut notes = Vec::new();
        if let Some([num, den]) = &self.ratio_of {
            let parts = row.and_then(|row| Some((numeric(row, num)?, numeric(row, den)?)));
            match parts {
                None => {
                    return fail(format!(
                        "{name}: ratio fields '{num}' / '{den}' missing or not numeric"
                    ));
                }
                Some((_, d)) if d == 0.0 => notes.push(format!("{den} is zero")),
                Some((n, d)) => {
                    let expected = n / d;
                    let tolerance = self.tolerance.unwrap_or(RATIO_TOLERANCE);
                    if !approx_eq(expected, value, tolerance) {
                        return fail(format!(
                            "{name}: {shown} but {num} / {den} = {} (difference {:+.2})",
                            display(expected),
                            value - expected
                        ));
                    }
                    notes.push(format!("matches {num} / {den}"));
                }
            }
        }
        if let Some(other) = &self.below_field {
            let Some(limit) = row.and_then(|row| numeric(row, other)) else {
                return fail(format!("{name}: field '{other}' missing or not numeric"));
            };
            if approx_eq(value, limit, 0.0) {
                return CheckResult {
                    verdict: Verdict::Warn,
                    message: format!("{name}: {shown} equals {other}, expected it to be lower"),
                };
            }
            if value > limit {
                return fail(format!(
                    "{name}: {shown} is above {other} ({})",
                    display(limit)
                ));
            }
            notes.push(format!("below {other} ({})", display(limit)));
        }
        let noted = if notes.is_empty() {
            String::new()
        } else {
            format!(", {}", notes.join(", "))
        };

        if let Some(expected) = self.equals {
            if approx_eq(expected, value, tolerance) {
                return pass(format!(
                    "{name}: {shown} (expected {}){noted}",
                    display(expected)
                ));
            }
        }
        let in_range = match (self.min, self.max) {
            (None, None) => None,
            (min, max) => Some(
                min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max),
            ),
        };
        if in_range == Some(true) {
            return pass(format!("{name}: {shown} within {}{noted}", self.range_text()));
        }
        if self.equals.is_none() && in_range.is_none() {
            return pass(format!("{name}: {shown}{noted}"));
        }

        let mut message = format!("{name}: got {shown}");
        if let Some(expected) = self.equals {
            message.push_str(&format!(
                ", expected {} (difference {:+})",
                display(expected),
                value - expected
            ));
        }
        if in_range == Some(false) {
            message.push_str(&format!(", outside {}", self.range_text()));
        }
        CheckResult {
            verdict: Verdict::Warn,
            message,
        }
    }

    fn sum_in_row(&self, row: &Row, name: &str, total: f64) -> CheckResult {
        let mut sum = 0.0;
        for part in &self.sum_of {
            match numeric(row, part) {
                Some(v) => sum += v,
                None => return fail(format!("{name}: field '{part}' missing or not numeric")),
            }
        }
        let parts = self.sum_of.join(" + ");
        if approx_eq(sum, total, self.tolerance.unwrap_or(1e-6)) {
            pass(format!("{name}: {parts} = {}", display(total)))
        } else {
            fail(format!(
                "{name}: {parts} = {} but total is {}",
                display(sum),
                display(total)
            ))
        }
    }

    fn select(&self, rows: &[Row], field: &str) -> Result<f64, String> {
        if self.aggregate == Aggregate::Sum {
            if rows.is_empty() {
                return Err("no data returned".into());
            }
            return rows.iter().try_fold(0.0, |acc, row| {
                numeric(row, field)
                    .map(|v| acc + v)
                    .ok_or_else(|| format!("field '{field}' missing or not numeric"))
            });
        }
        let row = self.pick_row(rows)?;
        let value =
            numeric(row, field).ok_or_else(|| format!("field '{field}' missing or not numeric"))?;
        if !self.share {
            return Ok(value);
        }
        let total: f64 = rows.iter().filter_map(|r| numeric(r, field)).sum();
        Ok(if total > 0.0 { value / total * 100.0 } else { 0.0 })
    }

    fn pick_row<'a>(&self, rows: &'a [Row]) -> Result<&'a Row, String> {
        if self.filtered() {
            return rows.iter().find(|row| self.matches(row)).ok_or_else(|| {
                let wanted: Vec<String> = self
                    .matching
                    .iter()
                    .map(|(f, v)| format!("{f}={v}"))
                    .chain(self.where_contains.iter().map(|(f, v)| format!("{f}~{v}")))
                    .collect();
                format!("no row where {}", wanted.join(", "))
            });
        }
        let index = self.row.unwrap_or(0);
        rows.get(index).ok_or_else(|| {
            if rows.is_empty() {
                "no data returned".to_string()
            } else {
                format!("row {index} not present ({} rows)", rows.len())
            }
        })
    }

    fn range_text(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("[{}, {}]", display(min), display(max)),
            (Some(min), None) => format!(">= {}", display(min)),
            (None, Some(max)) => format!("<= {}", display(max)),
            (None, None) => "any".into(),
        }
    }
}

/// Cents, for averages recomputed from their parts.
const RATIO_TOLERANCE: f64 = 0.01;

fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance.max(f64::EPSILON * a.abs().max(b.abs()))
}

fn display(value: f64) -> String {
    if value.fract() == 0.0 {
        group_thousands(value, 0)
    } else {
        group_thousands(value, 2)
    }
}

fn pass(message: String) -> CheckResult {
    CheckResult {
        verdict: Verdict::Pass,
        message,
    }
}

fn fail(message: String) -> CheckResult {
    CheckResult {
        verdict: Verdict::Fail,
        message,
    }
}
