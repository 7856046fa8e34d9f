//! Job execution module
//!
//! Moves documents from a [`storage::Source`] into normalized tables of a
//! [`storage::Destination`].

mod executor;
pub mod sql;
pub mod storage;

pub use executor::{JobError, JobExecutor, MULTI_ROW_VALUES_DIALECTS, Options, RootRun};
