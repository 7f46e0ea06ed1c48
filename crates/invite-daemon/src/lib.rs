//! Invite Daemon library
//!
//! This module provides the core components for the invite daemon:
//! - HTTP clients for the upstream platform
//! - Webhook ingestion and administrative REST API
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod upstream;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
pub use upstream::{HttpInviteSource, HttpRoleGranter, UpstreamClient};
