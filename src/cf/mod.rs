//! CF CLI interaction module
//!
//! Runs the `cf` binary, classifies its output, and exposes the operations
//! callers use: session, targeting, services and apps.
//!
//! # Module Structure
//!
//! - [`cli`] - Process runner and the [`cli::CliRunner`] seam
//! - [`classify`] - Turns loose stdout banners into failures
//! - [`cf_config`] - Read-only access to `cf`'s own configuration file
//! - [`client`] - Session object ([`client::CfClient`]) with `cf curl` helpers
//! - [`auth`] - Login, logout, API endpoint, OAuth token
//! - [`targets`] - Saved targets, organizations and spaces
//! - [`services`] - Service instances, offerings, plans, keys, local binding
//! - [`apps`] - Applications
//!
//! # Example
//!
//! ```ignore
//! use cf_tools::cf::{client::CfClient, targets::cf_get_available_orgs};
//!
//! async fn example() -> cf_tools::Result<()> {
//!     let client = CfClient::from_env();
//!     let orgs = cf_get_available_orgs(&client, None, None).await?;
//!     Ok(())
//! }
//! ```

pub mod apps;
pub mod auth;
pub mod cf_config;
pub mod classify;
pub mod cli;
pub mod client;
pub mod services;
pub mod targets;

/// Owned argument vector from string slices
pub(crate) fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
