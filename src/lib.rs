//! Offline cache orchestrator for the helpdesk PWA client.
//!
//! Runs as a background worker independent of any page: classifies every
//! intercepted request, applies a per-category caching strategy over named,
//! versioned cache stores, and bridges control messages and push
//! notifications between the foreground application and the platform.

pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod fetch;
pub mod http;
pub mod notify;
pub mod strategy;
pub mod worker;
