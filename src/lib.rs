//! Breadboard firmware library.
//!
//! Exposes the runtime for integration testing and for the firmware
//! binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod app;
pub mod config;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod scheduler;
