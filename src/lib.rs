//! Mapping-driven normalization of JSON documents into related tables.
//!
//! A YAML mapping declares, per destination table, which document fields feed
//! which columns. Nested lists become child tables linked by generated
//! surrogate keys. See [`job::JobExecutor`] for the orchestration entry point.

pub mod backend;
pub mod config;
pub mod deploy;
pub mod job;
pub mod process_data;
pub mod progress;
pub mod schema;
pub mod value;

#[cfg(test)]
mod tests;
