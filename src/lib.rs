//! Uplink NAT - uplink selection and NAT reconciliation for a bridged access point
//!
//! Invoked by a network event dispatcher whenever an interface changes. Each
//! run re-scans the candidate uplinks, picks the first usable one and makes the
//! bridge address, IPv4 forwarding and owned NAT/forward rules match it.

pub mod config;
pub mod error;
pub mod firewall;
pub mod logging;
pub mod network;
pub mod reconcile;

pub use error::AppError;
