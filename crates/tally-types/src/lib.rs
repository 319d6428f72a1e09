//! Tally Types
//!
//! This crate defines the value and record types shared by the Tally crates
//! (currently `tally-core` and `tally-cli`). Keeping them here lets the CLI
//! build and decode records without pulling in the store itself.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod record;
mod value;

pub use record::{Record, RecordKey};
pub use value::{FieldKind, FieldValue};
