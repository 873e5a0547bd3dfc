//! Software component catalog.
//!
//! Components, the teams that own them, and the identicons generated for
//! each component by an external image service. The HTTP API lives in
//! [`web`]; missing identicons are filled in by the background loop in
//! [`identicon::backfill`].

pub mod config;
pub mod database;
pub mod errors;
pub mod identicon;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod web;
