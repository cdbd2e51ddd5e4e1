//! Email outbox worker and delivery abstractions.
//!
//! The reset flow enqueues rows in `email_outbox` inside the same transaction
//! as the state change it announces, so a reset email can never be sent for a
//! token that was rolled back. A background task polls the table, locks a
//! batch with `FOR UPDATE SKIP LOCKED`, and hands each row to an
//! `EmailSender`. Failed deliveries are retried with exponential backoff and
//! jitter until a max attempt threshold, then marked `failed`.
//!
//! Templates used by this service: `password_reset` (carries the reset link)
//! and `password_reset_confirmation`. The default sender for local dev is
//! `LogEmailSender`, which logs the payload and reports success.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";
pub const TEMPLATE_PASSWORD_RESET_CONFIRMATION: &str = "password_reset_confirmation";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds).max(self.backoff_base);
        self
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = process_outbox_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }

            sleep(config.poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Lock a batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        match sender.send(&message) {
            Ok(()) => mark_sent(&mut tx, id, attempts).await?,
            Err(err) => mark_failed(&mut tx, id, attempts, &err.to_string(), config).await?,
        }
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn mark_sent(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'sent',
            attempts = $2,
            last_error = NULL,
            sent_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox status to sent")?;
    Ok(())
}

async fn mark_failed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    last_error: &str,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let attempts_i32 = i32::try_from(attempts).unwrap_or(i32::MAX);
    if attempts >= config.max_attempts {
        let query = r"
            UPDATE email_outbox
            SET status = 'failed',
                attempts = $2,
                last_error = $3
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(attempts_i32)
            .bind(last_error)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to update outbox status to failed")?;
        return Ok(());
    }

    let delay = backoff_delay(attempts, config.backoff_base, config.backoff_max);
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE email_outbox
        SET status = 'pending',
            attempts = $2,
            last_error = $3,
            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(attempts_i32)
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox retry schedule")?;
    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max).min(max);
    jitter_delay(delay)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    // Spread retries across [half, full] so workers don't stampede.
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        // The jitter keeps the delay within [half, full] of the raw backoff.
        for (attempt, raw_secs) in [(1u32, 5u64), (2, 10), (3, 20), (10, 300), (40, 300)] {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay >= Duration::from_millis(raw_secs * 500));
            assert!(delay <= Duration::from_secs(raw_secs));
        }
    }

    #[test]
    fn tiny_delays_skip_jitter() {
        assert_eq!(jitter_delay(Duration::from_millis(1)), Duration::from_millis(1));
    }

    #[test]
    fn config_floors_invalid_values() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0);

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert!(config.backoff_max >= config.backoff_base);
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = EmailMessage {
            to_email: "alice@example.com".to_string(),
            template: TEMPLATE_PASSWORD_RESET.to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
