//! Concrete source and destination implementations

pub mod local;
