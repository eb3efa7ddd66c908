//! Centralized error types and handling

use std::time::Duration;
use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network operation error: {0}")]
    Network(#[from] NetworkError),

    #[error("Firewall error: {0}")]
    Firewall(#[from] FirewallError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Reconciliation did not finish within {0:?}")]
    Timeout(Duration),
}

/// Network query and mutation errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to open netlink connection: {0}")]
    Connection(String),

    #[error("Network query failed: {0}")]
    Query(String),

    #[error("Network operation failed: {0}")]
    OperationFailed(String),

    #[error("Failed to set IPv4 forwarding via {path}: {reason}")]
    Forwarding { path: String, reason: String },
}

/// Firewall rule management errors
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("iptables command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to spawn iptables: {0}")]
    Spawn(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Run lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to open lock file {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to acquire run lock: {0}")]
    Acquire(String),
}

/// Fatal reconciliation errors. Everything else is logged and swallowed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("IPv4 forwarding could not be enabled: {0}")]
    ForwardingFailed(#[source] NetworkError),
}
