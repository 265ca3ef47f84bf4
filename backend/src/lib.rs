//! Subscriptions Backend Library
//!
//! CRUD service for named offerings ("services") and users' month-granular
//! subscriptions to them, with a cost aggregate over a reporting window.
//! The binary in `src/main.rs` wires these modules together.

pub mod api;
pub mod billing;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod month;
pub mod repository;
pub mod state;
