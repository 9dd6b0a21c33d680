use crate::api::{LoadError, LoadResponse, RawResponse, Row, Transport};
use crate::expect::{CheckResult, Verdict};
use crate::schema::TestCase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RULE: &str = "============================================================";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Passed,
    Failed,
    Timeout,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Passed => "PASSED",
            Status::Failed => "FAILED",
            Status::Timeout => "TIMEOUT",
            Status::Error => "ERROR",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TestRecord {
    pub test_id: String,
    pub name: String,
    pub status: Status,
    /// Seconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timeout: usize,
    pub error: usize,
}

impl Summary {
    pub fn from_records(records: &[TestRecord]) -> Self {
        let count = |status: Status| records.iter().filter(|r| r.status == status).count();
        Summary {
            total: records.len(),
            passed: count(Status::Passed),
            failed: count(Status::Failed),
            timeout: count(Status::Timeout),
            error: count(Status::Error),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// What a single case observed, before it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub error: Option<String>,
    pub rows: Option<Vec<Row>>,
    /// One entry per expectation, in fixture order.
    pub checks: Vec<CheckResult>,
}

/// Maps a transport result onto one of the four terminal statuses.
///
/// `elapsed` is measured by the caller; any transport failure at or past
/// the deadline counts as a timeout.
pub fn classify(
    result: Result<RawResponse, LoadError>,
    elapsed: Duration,
    timeout: Duration,
    case: &TestCase,
) -> Outcome {
    let raw = match result {
        Ok(raw) => raw,
        Err(LoadError::Timeout(_)) => return timed_out(elapsed),
        Err(_) if elapsed >= timeout => return timed_out(elapsed),
        Err(e) => return errored(e),
    };

    let rows = match LoadResponse::parse(&raw) {
        Ok(response) => response.rows,
        Err(LoadError::Server(message)) => {
            return Outcome {
                status: Status::Failed,
                error: Some(message),
                rows: None,
                checks: Vec::new(),
            };
        }
        Err(e) => return errored(e),
    };

    if case.expectations.is_empty() {
        return Outcome {
            status: Status::Passed,
            error: None,
            rows,
            checks: Vec::new(),
        };
    }
    let Some(data) = rows.as_deref() else {
        return Outcome {
            status: Status::Failed,
            error: Some(
                LoadError::UnexpectedShape("response has no `data` field".into()).to_string(),
            ),
            rows: None,
            checks: Vec::new(),
        };
    };

    let checks: Vec<CheckResult> = case.expectations.iter().map(|e| e.check(data)).collect();
    let first_problem = checks
        .iter()
        .find(|check| check.verdict != Verdict::Pass)
        .map(|check| check.message.clone());
    Outcome {
        status: if first_problem.is_none() { Status::Passed } else { Status::Failed },
        error: first_problem,
        rows,
        checks,
    }
}

fn timed_out(elapsed: Duration) -> Outcome {
    Outcome {
        status: Status::Timeout,
        error: Some(format!("TIMEOUT after {:.2}s", elapsed.as_secs_f64())),
        rows: None,
        checks: Vec::new(),
    }
}

fn errored(e: LoadError) -> Outcome {
    Outcome {
        status: Status::Error,
        error: Some(e.to_string()),
        rows: None,
        checks: Vec::new(),
    }
}

pub struct Harness<T: Transport> {
    transport: T,
    timeout: Duration,
    verbose: bool,
    results: Vec<TestRecord>,
}

impl<T: Transport> Harness<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            verbose: false,
            results: Vec::new(),
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn results(&self) -> &[TestRecord] {
        &self.results
    }

    pub fn into_results(self) -> Vec<TestRecord> {
        self.results
    }

    pub async fn run_case(&mut self, case: &TestCase) -> &TestRecord {
        println!("\nTesting {}: {}", case.id, case.name);
        if self.verbose {
            if !case.description.is_empty() {
                println!("Description: {}", case.description);
            }
            match serde_json::to_string_pretty(&case.query) {
                Ok(query) => println!("Query: {query}"),
                Err(e) => tracing::warn!(case = %case.id, error = %e, "could not print query"),
            }
        }

        let start = Instant::now();
        let load = self.transport.load(&case.query);
        let result = match tokio::time::timeout(self.timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout(self.timeout.as_secs_f64())),
        };
        let elapsed = start.elapsed();
        tracing::debug!(case = %case.id, elapsed_ms = elapsed.as_millis() as u64, "load finished");

        let outcome = classify(result, elapsed, self.timeout, case);
        for check in &outcome.checks {
            println!("  {check}");
        }
        let duration = elapsed.as_secs_f64();
        match (&outcome.status, &outcome.error) {
            (Status::Passed, _) => println!("✓ PASSED ({duration:.2}s)"),
            (Status::Timeout, _) => println!("❌ TIMEOUT ({duration:.2}s)"),
            (status, Some(message)) => println!("❌ {status} ({duration:.2}s) - {message}"),
            (status, None) => println!("❌ {status} ({duration:.2}s)"),
        }
        if let (Some(table), Some(rows)) = (&case.table, &outcome.rows) {
            print!("\n{}", table.render(rows));
        }

        self.results.push(TestRecord {
            test_id: case.id.clone(),
            name: case.name.clone(),
            status: outcome.status,
            duration,
            error: outcome.error,
        });
        let last = self.results.len() - 1;
        &self.results[last]
    }

    /// Runs every case in order. A failing case never stops the ones after it.
    pub async fn run_all(&mut self, cases: &[TestCase]) -> Summary {
        for case in cases {
            self.run_case(case).await;
        }
        self.summary()
    }

    pub fn summary(&self) -> Summary {
        Summary::from_records(&self.results)
    }

    pub fn exit_code(&self) -> u8 {
        if self.summary().all_passed() { 0 } else { 1 }
    }

    pub fn print_summary(&self) {
        let summary = self.summary();
        println!("\n{RULE}\nTEST SUMMARY\n{RULE}\n");
        println!("Total Tests: {}", summary.total);
        println!("Passed: {}", summary.passed);
        println!("Failed: {}", summary.failed);
        println!("Timeout: {}", summary.timeout);
        println!("Error: {}", summary.error);
        println!("\nDetailed Results:\n");
        for record in &self.results {
            println!("  {}: {} ({:.2}s)", record.test_id, record.status, record.duration);
            if let Some(error) = &record.error {
                println!("    Error: {error}");
            }
        }
        println!();
    }
}
