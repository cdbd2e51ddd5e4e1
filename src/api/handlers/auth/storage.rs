//! Database helpers for users, refresh tokens, and reset tokens.
//!
//! Refresh-token revocation is monotonic: `revoked_at` is set once and never
//! cleared. The conditional single-row revoke returns the affected-row count
//! so callers can use it as the linearization point for concurrent rotation
//! attempts; family revocation is one bulk update so a concurrently minted
//! sibling cannot slip through a read-then-write loop.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// User shape safe to hand around; never carries secret material.
#[derive(Debug, Clone)]
pub(super) struct SafeUser {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) given_name: String,
    pub(super) family_name: String,
}

/// User plus the password credential hash. Only the authentication and
/// reset paths fetch this shape.
pub(super) struct UserWithCredential {
    pub(super) user: SafeUser,
    pub(super) password_hash: String,
}

/// Outcome when attempting to create a new user + password credential.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created(Uuid),
    Conflict,
}

/// Refresh-token record as observed through the store. The Live/Expired/
/// Revoked distinction is derived from the timestamp columns at read time.
#[derive(Debug)]
pub(super) struct RefreshTokenRecord {
    pub(super) user_id: Uuid,
    pub(super) family_id: Uuid,
    pub(super) revoked: bool,
    pub(super) expired: bool,
}

fn db_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(super) async fn lookup_safe_user(pool: &PgPool, user_id: Uuid) -> Result<Option<SafeUser>> {
    let query = "SELECT id, email, given_name, family_name FROM users WHERE id = $1";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await
        .context("failed to lookup user by id")?;

    Ok(row.map(|row| SafeUser {
        id: row.get("id"),
        email: row.get("email"),
        given_name: row.get("given_name"),
        family_name: row.get("family_name"),
    }))
}

pub(super) async fn lookup_safe_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<SafeUser>> {
    let query = "SELECT id, email, given_name, family_name FROM users WHERE email = $1";
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| SafeUser {
        id: row.get("id"),
        email: row.get("email"),
        given_name: row.get("given_name"),
        family_name: row.get("family_name"),
    }))
}

/// Fetch the credential-bearing shape for local authentication.
pub(super) async fn lookup_user_with_credential(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserWithCredential>> {
    let query = r"
        SELECT users.id, users.email, users.given_name, users.family_name,
               user_credentials.secret_hash
        FROM users
        JOIN user_credentials
          ON user_credentials.user_id = users.id
         AND user_credentials.kind = 'password'
        WHERE users.email = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await
        .context("failed to lookup user credential")?;

    Ok(row.map(|row| UserWithCredential {
        user: SafeUser {
            id: row.get("id"),
            email: row.get("email"),
            given_name: row.get("given_name"),
            family_name: row.get("family_name"),
        },
        password_hash: row.get("secret_hash"),
    }))
}

pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    given_name: &str,
    family_name: &str,
) -> Result<RegisterOutcome> {
    // User row and password credential land together or not at all.
    let mut tx = pool.begin().await.context("begin register transaction")?;

    let query = r"
        INSERT INTO users (email, given_name, family_name)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(email)
        .bind(given_name)
        .bind(family_name)
        .fetch_one(&mut *tx)
        .instrument(db_span("INSERT", query))
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if super::utils::is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let query = r"
        INSERT INTO user_credentials (user_id, kind, secret_hash)
        VALUES ($1, 'password', $2)
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to insert password credential")?;

    tx.commit().await.context("commit register transaction")?;

    Ok(RegisterOutcome::Created(user_id))
}

pub(super) async fn insert_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    family_id: Uuid,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens (user_id, token_hash, family_id, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(family_id)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

pub(super) async fn find_refresh_token(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<RefreshTokenRecord>> {
    let query = r"
        SELECT user_id, family_id,
               revoked_at IS NOT NULL AS revoked,
               expires_at <= NOW() AS expired
        FROM refresh_tokens
        WHERE token_hash = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await
        .context("failed to lookup refresh token")?;

    Ok(row.map(|row| RefreshTokenRecord {
        user_id: row.get("user_id"),
        family_id: row.get("family_id"),
        revoked: row.get("revoked"),
        expired: row.get("expired"),
    }))
}

/// Conditionally revoke one token. Returns whether this caller observed the
/// Live state; a concurrent rotation's loser sees `false`.
pub(super) async fn revoke_refresh_token(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE token_hash = $1
          AND revoked_at IS NULL
    ";
    let result = sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke refresh token")?;
    Ok(result.rows_affected() > 0)
}

/// Revoke a token only if the caller owns it and it is Live. Used by logout,
/// where a mismatch is a silent no-op.
pub(super) async fn revoke_owned_refresh_token(
    pool: &PgPool,
    token_hash: &[u8],
    user_id: Uuid,
) -> Result<bool> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE token_hash = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > NOW()
    ";
    let result = sqlx::query(query)
        .bind(token_hash)
        .bind(user_id)
        .execute(pool)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke owned refresh token")?;
    Ok(result.rows_affected() > 0)
}

/// Revoke every token in a family, whatever its individual state. One bulk
/// update; returns how many rows flipped.
pub(super) async fn revoke_family(pool: &PgPool, family_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE family_id = $1
          AND revoked_at IS NULL
    ";
    let result = sqlx::query(query)
        .bind(family_id)
        .execute(pool)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke token family")?;
    Ok(result.rows_affected())
}

pub(super) async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE user_id = $1
          AND revoked_at IS NULL
    ";
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke user refresh tokens")?;
    Ok(result.rows_affected())
}

pub(super) async fn revoke_all_for_user_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE user_id = $1
          AND revoked_at IS NULL
    ";
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke user refresh tokens")?;
    Ok(result.rows_affected())
}

/// Maintenance sweep: drop refresh tokens that can never be presented again.
pub(super) async fn delete_expired_or_revoked(pool: &PgPool) -> Result<u64> {
    let query = r"
        DELETE FROM refresh_tokens
        WHERE expires_at <= NOW()
           OR revoked_at IS NOT NULL
    ";
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await
        .context("failed to sweep refresh tokens")?;
    Ok(result.rows_affected())
}

/// Maintenance sweep for reset tokens that are spent or past expiry.
pub(super) async fn delete_spent_reset_tokens(pool: &PgPool) -> Result<u64> {
    let query = r"
        DELETE FROM password_reset_tokens
        WHERE expires_at <= NOW()
           OR used_at IS NOT NULL
    ";
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await
        .context("failed to sweep reset tokens")?;
    Ok(result.rows_affected())
}

/// Invalidate any still-valid reset tokens for a user; only one reset token
/// may be usable per user at a time.
pub(super) async fn invalidate_reset_tokens(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<u64> {
    let query = r"
        UPDATE password_reset_tokens
        SET used_at = NOW()
        WHERE user_id = $1
          AND used_at IS NULL
          AND expires_at > NOW()
    ";
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to invalidate prior reset tokens")?;
    Ok(result.rows_affected())
}

pub(super) async fn insert_reset_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(&mut **tx)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to insert reset token")?;
    Ok(())
}

/// Atomically consume a reset token if it is unexpired and unused.
/// Returns the owning user id when this caller won the consume.
pub(super) async fn consume_reset_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
) -> Result<Option<Uuid>> {
    let query = r"
        UPDATE password_reset_tokens
        SET used_at = NOW()
        WHERE token_hash = $1
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to consume reset token")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Store a new password hash; returns false if the user has no password
/// credential (dangling reference).
pub(super) async fn update_password_hash(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<bool> {
    let query = r"
        UPDATE user_credentials
        SET secret_hash = $2,
            updated_at = NOW()
        WHERE user_id = $1
          AND kind = 'password'
    ";
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to update password hash")?;
    Ok(result.rows_affected() > 0)
}

/// Enqueue an outbox email inside the caller's transaction.
pub(super) async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload_json: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_json)
        .execute(&mut **tx)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to enqueue outbox email")?;
    Ok(())
}
