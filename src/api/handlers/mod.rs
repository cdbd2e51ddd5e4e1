//! API handlers for chiavi.

pub mod auth;
pub mod health;
pub mod root;
