#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod expect;
pub mod format;
pub mod harness;
pub mod query;
pub mod report;
pub mod schema;

pub use api::{CubeClient, LoadError, RawResponse, Transport};
pub use harness::{Harness, Status, Summary, TestRecord};
pub use schema::{Suite, TestCase};
