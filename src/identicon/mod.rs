//! Identicon generation
//!
//! [`client`] talks to the external image generator and [`backfill`] runs
//! the loop that gives every component exactly one identicon.

pub mod backfill;
pub mod client;

pub use backfill::{ComponentOutcome, CycleReport, IdenticonBackfill};
pub use client::{HttpIdenticonGenerator, IdenticonGenerator, IdenticonRequest};
