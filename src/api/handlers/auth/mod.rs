//! Credential and session lifecycle handlers.
//!
//! The sub-modules split along the component seams: `password` owns the KDF,
//! `tokens` the signed triad, `storage` the SQL, `provider` the credential
//! check, and `session`/`reset`/`register` the HTTP handlers on top.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

mod password;
mod principal;
mod provider;
pub mod register;
pub mod reset;
pub mod session;
mod state;
mod storage;
mod tokens;
mod types;
mod utils;


pub use state::{AuthConfig, AuthState};

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the hourly sweep that deletes refresh and reset tokens which can
/// never be presented again. Purely a storage-size concern; correctness
/// never depends on the sweep having run.
pub(crate) fn spawn_token_sweeper(pool: PgPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match storage::delete_expired_or_revoked(&pool).await {
                Ok(swept) if swept > 0 => info!(swept, "swept refresh tokens"),
                Ok(_) => {}
                Err(err) => error!("refresh token sweep failed: {err}"),
            }
            match storage::delete_spent_reset_tokens(&pool).await {
                Ok(swept) if swept > 0 => info!(swept, "swept reset tokens"),
                Ok(_) => {}
                Err(err) => error!("reset token sweep failed: {err}"),
            }

            sleep(SWEEP_INTERVAL).await;
        }
    })
}
