//! Auxiliary destinations

pub mod debug;
