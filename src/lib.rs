// =============================================================================
// KRISHILINK SERVICE - Library Root
// =============================================================================
// Crop marketplace service. Producers list crops, buyers send interests,
// owners accept or reject them. Accepting an interest reduces the crop's
// remaining quantity in the same atomic write that flips the status.
//
// The binary (main.rs) wires these modules into an HTTP server; tests drive
// the same router and workflow engine over the in-memory catalog store.
// =============================================================================

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod store;
pub mod workflow;
