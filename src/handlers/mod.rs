//! HTTP handlers for the Terraform remote-state protocol.

pub mod lock;
pub mod state;
