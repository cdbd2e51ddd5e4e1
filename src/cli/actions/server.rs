use crate::api;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub reset_floor_ms: u64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = api::handlers::auth::AuthConfig::new(
        args.frontend_base_url,
        args.access_token_secret,
        args.refresh_token_secret,
    )
    .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
    .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
    .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
    .with_reset_floor_ms(args.reset_floor_ms);

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, email_config).await
}
