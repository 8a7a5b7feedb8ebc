//! Shared data structures for the BIT-TQ decision lifecycle
//!
//! - `Readings`: one acquisition of named field variables
//! - `ProcessSample`: immutable snapshot appended to the sample store
//! - `Analysis` / `UrgencyLevel`: classification of the quality index
//! - `Decision`: a proposed or executed set of parameter changes

mod decision;
mod process;

pub use decision::*;
pub use process::*;
