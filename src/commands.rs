use std::path::Path;

use anyhow::{Context, Result};

use crate::api::{CubeClient, LoadResponse, Transport};
use crate::cli::{ConnectionArgs, ListArgs, QueryArgs, RunArgs};
use crate::config::{self, Connection, ConfigError, USAGE_HINT};
use crate::format::TableSpec;
use crate::harness::Harness;
use crate::query::Query;
use crate::report::Report;
use crate::schema::Suite;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

const RULE: &str = "============================================================";

fn load_suite(path: Option<&Path>) -> Result<Suite> {
    match path {
        Some(path) => Suite::from_file(path).map_err(Into::into),
        None => Suite::builtin().context("built-in suite is invalid"),
    }
}

/// `Ok(None)` means the usage message was printed and the caller should stop.
fn connect(args: &ConnectionArgs) -> Result<Option<Connection>> {
    let now = chrono::Utc::now().timestamp();
    match config::resolve_connection(
        args.url.as_deref(),
        args.token.as_deref(),
        args.secret.as_deref(),
        now,
    ) {
        Ok(connection) => Ok(Some(connection)),
        Err(e @ (ConfigError::MissingUrl | ConfigError::MissingCredentials)) => {
            println!("ERROR: {e}\n");
            println!("{USAGE_HINT}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run(args: &RunArgs, connection: &ConnectionArgs) -> Result<u8> {
    let suite = load_suite(args.suite.as_deref())?.select(&args.cases)?;
    let Some(conn) = connect(connection)? else {
        return Ok(EXIT_FAILURE);
    };
    let timeout = config::resolve_timeout(connection.timeout, suite.suite.timeout_secs);
    let client = CubeClient::new(&conn.url, &conn.token, timeout)?;
    tracing::info!(suite = %suite.suite.name, cases = suite.cases.len(), "running suite");

    println!("{RULE}");
    println!("{}", suite.suite.name.to_uppercase());
    println!("{RULE}");
    if let Some(description) = &suite.suite.description {
        println!("{description}");
    }
    println!("Timeout: {}s", timeout.as_secs());
    println!("API URL: {}", conn.url);
    println!("{RULE}");

    let mut harness = Harness::new(client, timeout).verbose(connection.verbose);
    harness.run_all(&suite.cases).await;
    harness.print_summary();
    let exit_code = harness.exit_code();

    if let Some(path) = &args.output {
        Report::new(Some(suite.suite.name.as_str()), harness.into_results()).save(path)?;
        println!("Results saved to: {}", path.display());
    }
    Ok(exit_code)
}

pub fn list(args: &ListArgs) -> Result<u8> {
    let suite = load_suite(args.suite.as_deref())?;
    println!("{} ({} cases)", suite.suite.name, suite.cases.len());
    for case in &suite.cases {
        let checks = match case.expectations.len() {
            0 => String::new(),
            n => format!(" [{n} checks]"),
        };
        println!("  {:<14} {}{checks}", case.id, case.name);
        if !case.description.is_empty() {
            println!("  {:<14} {}", "", case.description);
        }
    }
    Ok(EXIT_SUCCESS)
}

pub async fn query(args: &QueryArgs, connection: &ConnectionArgs) -> Result<u8> {
    let query: Query = serde_json::from_str(&args.query).context("query is not valid JSON")?;
    query.validate()?;
    let Some(conn) = connect(connection)? else {
        return Ok(EXIT_FAILURE);
    };
    let timeout = config::resolve_timeout(connection.timeout, None);
    let client = CubeClient::new(&conn.url, &conn.token, timeout)?;
    query_with(&client, &query, args).await
}

pub async fn query_with<T: Transport>(client: &T, query: &Query, args: &QueryArgs) -> Result<u8> {
    let response = client
        .load(query)
        .await
        .and_then(|raw| LoadResponse::parse(&raw));
    let rows = match response {
        Ok(LoadResponse { rows: Some(rows) }) => rows,
        Ok(LoadResponse { rows: None }) => {
            println!("❌ Unexpected response format: no `data` field");
            return Ok(EXIT_FAILURE);
        }
        Err(e) => {
            println!("❌ ERROR: {e}");
            return Ok(EXIT_FAILURE);
        }
    };

    if rows.is_empty() {
        println!("No data returned");
        return Ok(EXIT_SUCCESS);
    }
    let mut table = TableSpec::from_members(&query.members(), &rows);
    table.sort_by = args.sort_by.clone();
    table.totals = args.totals;
    print!("{}", table.render(&rows));
    println!("\n{} rows", rows.len());
    Ok(EXIT_SUCCESS)
}
