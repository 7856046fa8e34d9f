//! Collaborator interfaces of the executor

mod destination;
mod source;

pub use destination::{Destination, InsertOptions};
pub use source::Source;
