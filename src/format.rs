use crate::api::Row;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Numeric value of a field. The API encodes most numbers as strings.
pub fn numeric(row: &Row, field: &str) -> Option<f64> {
    match row.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn label(row: &Row, field: &str) -> String {
    match row.get(field) {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Stable sort by a numeric field, largest first. Rows without a number go last.
pub fn sort_desc(rows: &mut [&Row], field: &str) {
    rows.sort_by(|a, b| match (numeric(a, field), numeric(b, field)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// `13359.0` → `13,359`; `1234.567` with two decimals → `1,234.57`.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 4);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    let is_zero = formatted.chars().all(|c| c == '0' || c == '.');
    if value.is_sign_negative() && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellFormat {
    #[default]
    Auto,
    Text,
    Integer,
    Decimal,
    Percent,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Column {
    pub label: String,
    #[serde(default)]
    pub field: Option<String>,
    /// `[numerator, denominator]`, e.g. revenue over order count for AOV.
    #[serde(default)]
    pub ratio: Option<[String; 2]>,
    /// Percentage of this field's column total.
    #[serde(default)]
    pub share_of: Option<String>,
    #[serde(default)]
    pub format: Option<CellFormat>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub width: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnSource<'a> {
    Field(&'a str),
    Ratio(&'a str, &'a str),
    Share(&'a str),
}

impl Column {
    pub fn field(label: &str, field: &str) -> Self {
        Self {
            label: label.to_string(),
            field: Some(field.to_string()),
            ratio: None,
            share_of: None,
            format: None,
            prefix: None,
            width: None,
        }
    }

    pub fn source(&self) -> Result<ColumnSource<'_>, String> {
        match (&self.field, &self.ratio, &self.share_of) {
            (Some(f), None, None) => Ok(ColumnSource::Field(f)),
            (None, Some([num, den]), None) => Ok(ColumnSource::Ratio(num, den)),
            (None, None, Some(f)) => Ok(ColumnSource::Share(f)),
            _ => Err(format!(
                "column '{}' needs exactly one of `field`, `ratio` or `share_of`",
                self.label
            )),
        }
    }

    fn effective_format(&self, source: ColumnSource<'_>) -> CellFormat {
        match (self.format, source) {
            (Some(format), _) => format,
            (None, ColumnSource::Field(_)) => CellFormat::Auto,
            (None, ColumnSource::Ratio(..)) => CellFormat::Decimal,
            (None, ColumnSource::Share(_)) => CellFormat::Percent,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct TableSpec {
    #[serde(default, rename = "column")]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub totals: bool,
}

impl TableSpec {
    /// One column per field, in the order given, followed by any other
    /// fields the rows carry.
    pub fn from_members(members: &[String], rows: &[Row]) -> Self {
        let mut fields: Vec<String> = members.to_vec();
        for row in rows {
            for key in row.keys() {
                if !fields.contains(key) {
                    fields.push(key.clone());
                }
            }
        }
        let columns = fields
            .iter()
            .filter(|f| rows.is_empty() || rows.iter().any(|r| r.contains_key(*f)))
            .map(|f| Column::field(f, f))
            .collect();
        Self {
            columns,
            sort_by: None,
            totals: false,
        }
    }

    pub fn render(&self, rows: &[Row]) -> String {
        let mut ordered: Vec<&Row> = rows.iter().collect();
        if let Some(field) = &self.sort_by {
            sort_desc(&mut ordered, field);
        }

        let sources: Vec<ColumnSource<'_>> = self
            .columns
            .iter()
            .map(|c| c.source().unwrap_or(ColumnSource::Field(&c.label)))
            .collect();

        let share_totals: Vec<f64> = sources
            .iter()
            .map(|source| match source {
                ColumnSource::Share(field) => sum(&ordered, field),
                _ => 0.0,
            })
            .collect();

        let mut body: Vec<Vec<Cell>> = ordered
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(&sources)
                    .zip(&share_totals)
                    .map(|((column, source), share_total)| {
                        let value = match *source {
                            ColumnSource::Field(field) => match numeric(row, field) {
                                Some(n) => CellValue::Number(n),
                                None => CellValue::Text(label(row, field)),
                            },
                            ColumnSource::Ratio(num, den) => CellValue::Number(ratio(
                                numeric(row, num).unwrap_or(0.0),
                                numeric(row, den).unwrap_or(0.0),
                            )),
                            ColumnSource::Share(field) => CellValue::Number(
                                ratio(numeric(row, field).unwrap_or(0.0), *share_total) * 100.0,
                            ),
                        };
                        Cell::render(column, *source, value)
                    })
                    .collect()
            })
            .collect();

        if self.totals {
            body.push(self.totals_row(&ordered, &sources));
        }

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                body.iter()
                    .map(|r| r[i].text.chars().count())
                    .chain([column.label.chars().count(), column.width.unwrap_or(0)])
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let right: Vec<bool> = (0..self.columns.len())
            .map(|i| !body.is_empty() && body.iter().all(|r| r[i].numeric || r[i].text.is_empty()))
            .collect();

        let line_width = widths.iter().sum::<usize>() + widths.len().saturating_sub(1);
        let mut out = String::new();
        let header: Vec<Cell> = self
            .columns
            .iter()
            .map(|c| Cell {
                text: c.label.clone(),
                numeric: false,
            })
            .collect();
        push_line(&mut out, &header, &widths, &right);
        out.push_str(&"-".repeat(line_width));
        out.push('\n');

        let data_rows = if self.totals { body.len() - 1 } else { body.len() };
        for (i, cells) in body.iter().enumerate() {
            if self.totals && i == data_rows {
                out.push_str(&"-".repeat(line_width));
                out.push('\n');
            }
            push_line(&mut out, cells, &widths, &right);
        }
        out
    }

    fn totals_row(&self, rows: &[&Row], sources: &[ColumnSource<'_>]) -> Vec<Cell> {
        self.columns
            .iter()
            .zip(sources)
            .enumerate()
            .map(|(i, (column, source))| {
                let format = column.effective_format(*source);
                let value = match *source {
                    ColumnSource::Field(field) => {
                        let numeric_column = !rows.is_empty()
                            && rows.iter().all(|r| numeric(r, field).is_some());
                        if matches!(format, CellFormat::Text) || !numeric_column {
                            CellValue::Text(if i == 0 { "TOTAL".into() } else { String::new() })
                        } else {
                            CellValue::Number(sum(rows, field))
                        }
                    }
                    ColumnSource::Ratio(num, den) => {
                        CellValue::Number(ratio(sum(rows, num), sum(rows, den)))
                    }
                    ColumnSource::Share(_) => CellValue::Number(100.0),
                };
                Cell::render(column, *source, value)
            })
            .collect()
    }
}

fn sum(rows: &[&Row], field: &str) -> f64 {
    rows.iter().filter_map(|r| numeric(r, field)).sum()
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

enum CellValue {
    Text(String),
    Number(f64),
}

struct Cell {
    text: String,
    numeric: bool,
}

impl Cell {
    fn render(column: &Column, source: ColumnSource<'_>, value: CellValue) -> Self {
        let format = column.effective_format(source);
        let prefix = column.prefix.as_deref().unwrap_or("");
        match (value, format) {
            (CellValue::Text(text), _) => Cell {
                text,
                numeric: false,
            },
            (CellValue::Number(n), CellFormat::Text) => Cell {
                text: n.to_string(),
                numeric: false,
            },
            (CellValue::Number(n), CellFormat::Integer) => Cell {
                text: format!("{prefix}{}", group_thousands(n, 0)),
                numeric: true,
            },
            (CellValue::Number(n), CellFormat::Decimal) => Cell {
                text: format!("{prefix}{}", group_thousands(n, 2)),
                numeric: true,
            },
            (CellValue::Number(n), CellFormat::Percent) => Cell {
                text: format!("{n:.1}%"),
                numeric: true,
            },
            (CellValue::Number(n), CellFormat::Auto) => {
                let decimals = if n.fract() == 0.0 { 0 } else { 2 };
                Cell {
                    text: format!("{prefix}{}", group_thousands(n, decimals)),
                    numeric: true,
                }
            }
        }
    }
}

fn push_line(out: &mut String, cells: &[Cell], widths: &[usize], right: &[bool]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .zip(right)
        .map(|((cell, width), right)| {
            if *right {
                format!("{:>width$}", cell.text, width = width)
            } else {
                format!("{:<width$}", cell.text, width = width)
            }
        })
        .collect();
    out.push_str(line.join(" ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    fn channel_rows() -> Vec<Row> {
        rows(json!([
            {"transaction_lines.channel_type": "RETAIL", "transaction_lines.total_revenue": "1000.6", "transaction_lines.transaction_count": "10"},
            {"transaction_lines.channel_type": "B2B_WHOLESALE", "transaction_lines.total_revenue": "3000", "transaction_lines.transaction_count": "2"},
            {"transaction_lines.channel_type": "OTHER", "transaction_lines.total_revenue": null, "transaction_lines.transaction_count": "0"}
        ]))
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(13359.0, 0), "13,359");
        assert_eq!(group_thousands(1234.567, 2), "1,234.57");
        assert_eq!(group_thousands(999.0, 0), "999");
        assert_eq!(group_thousands(-1234567.0, 0), "-1,234,567");
        assert_eq!(group_thousands(-0.001, 2), "0.00");
    }

    #[test]
    fn parses_string_encoded_numbers() {
        let row = &channel_rows()[0];
        assert_eq!(numeric(row, "transaction_lines.total_revenue"), Some(1000.6));
        assert_eq!(numeric(row, "transaction_lines.channel_type"), None);
        assert_eq!(numeric(row, "missing"), None);
        assert_eq!(label(row, "missing"), "N/A");
    }

    #[test]
    fn sorts_descending_with_missing_last() {
        let rows = channel_rows();
        let mut refs: Vec<&Row> = rows.iter().collect();
        sort_desc(&mut refs, "transaction_lines.total_revenue");
        let order: Vec<String> = refs
            .iter()
            .map(|r| label(r, "transaction_lines.channel_type"))
            .collect();
        assert_eq!(order, ["B2B_WHOLESALE", "RETAIL", "OTHER"]);
    }

    #[test]
    fn sorting_tolerates_nan_cells() {
        let rows: Vec<Row> = serde_json::from_value(json!([
            {"v": "3"}, {"v": "NaN"}, {"v": "10"}, {"v": "NaN"}, {"v": "1"}, {}
        ]))
        .unwrap();
        let mut refs: Vec<&Row> = rows.iter().collect();
        sort_desc(&mut refs, "v");
        let order: Vec<String> = refs.iter().map(|r| label(r, "v")).collect();
        assert_eq!(order, ["NaN", "NaN", "10", "3", "1", "N/A"]);
    }

    #[test]
    fn renders_ratios_shares_and_totals() {
        let spec: TableSpec = toml::from_str(
            r#"
            sort_by = "transaction_lines.total_revenue"
            totals = true

            [[column]]
            label = "Channel"
            field = "transaction_lines.channel_type"

            [[column]]
            label = "AOV"
            ratio = ["transaction_lines.total_revenue", "transaction_lines.transaction_count"]

            [[column]]
            label = "Orders"
            field = "transaction_lines.transaction_count"
            format = "integer"

            [[column]]
            label = "Share"
            share_of = "transaction_lines.total_revenue"
            "#,
        )
        .unwrap();

        let text = spec.render(&channel_rows());
        let lines: Vec<&str> = text.lines().collect();
        let line = |a: &str, b: &str, c: &str, d: &str| format!("{a:<13} {b:>8} {c:>6} {d:>6}");
        assert_eq!(lines[0], line("Channel", "AOV", "Orders", "Share"));
        assert_eq!(lines[1], "-".repeat(36));
        assert_eq!(lines[2], line("B2B_WHOLESALE", "1,500.00", "2", "75.0%"));
        assert_eq!(lines[3], line("RETAIL", "100.06", "10", "25.0%"));
        assert_eq!(lines[4], line("OTHER", "0.00", "0", "0.0%"));
        assert_eq!(lines[5], "-".repeat(36));
        assert_eq!(lines[6], line("TOTAL", "333.38", "12", "100.0%"));
    }

    #[test]
    fn default_table_follows_members_then_extra_fields() {
        let rows = rows(json!([{"b": "1", "a": "x", "c": "2"}]));
        let spec = TableSpec::from_members(&["a".to_string(), "b".to_string(), "z".to_string()], &rows);
        let labels: Vec<&str> = spec.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
    }

    #[test]
    fn column_needs_single_source() {
        let mut column = Column::field("x", "x");
        assert_eq!(column.source(), Ok(ColumnSource::Field("x")));
        column.share_of = Some("x".into());
        assert!(column.source().is_err());
    }
}
