//! Postgres implementation of the user and refresh-token stores.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    InsertOutcome, NewRefreshToken, NewUser, RefreshToken, RefreshTokenStore, RotateOutcome, User,
    UserStore,
};

const INSERT_TOKEN: &str = r"
    INSERT INTO refresh_tokens
        (id, user_id, selector, validator_hash, user_agent, ip_address, created_at, expires_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id, user_id, selector, validator_hash, user_agent, ip_address,
              created_at, expires_at, revoked_at
";

const SELECT_TOKEN_BY_SELECTOR: &str = r"
    SELECT id, user_id, selector, validator_hash, user_agent, ip_address,
           created_at, expires_at, revoked_at
    FROM refresh_tokens
    WHERE selector = $1
";

const SELECT_TOKENS_BY_USER: &str = r"
    SELECT id, user_id, selector, validator_hash, user_agent, ip_address,
           created_at, expires_at, revoked_at
    FROM refresh_tokens
    WHERE user_id = $1
    ORDER BY created_at
";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

fn token_from_row(row: &PgRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        selector: row.get("selector"),
        validator_hash: row.get("validator_hash"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        // Normalize both sides so rows written before normalization still match.
        let query = r"
            SELECT id, email, password_hash, is_active, created_at
            FROM users
            WHERE lower(btrim(email)) = lower(btrim($1))
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, is_active, created_at
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn insert(&self, user: NewUser) -> Result<InsertOutcome<User>> {
        let query = r"
            INSERT INTO users (id, email, password_hash, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id, email, password_hash, is_active, created_at
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Created(user_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }
}

async fn insert_token<'e, E>(
    executor: E,
    token: &NewRefreshToken,
) -> Result<InsertOutcome<RefreshToken>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(INSERT_TOKEN)
        .bind(Uuid::new_v4())
        .bind(token.user_id)
        .bind(&token.selector)
        .bind(&token.validator_hash)
        .bind(token.user_agent.as_deref())
        .bind(token.ip_address.as_deref())
        .bind(token.created_at)
        .bind(token.expires_at)
        .fetch_one(executor)
        .instrument(db_span("INSERT", INSERT_TOKEN))
        .await;

    match result {
        Ok(row) => Ok(InsertOutcome::Created(token_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert refresh token"),
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<InsertOutcome<RefreshToken>> {
        insert_token(&self.pool, &token).await
    }

    async fn find_by_selector(&self, selector: &str) -> Result<Option<RefreshToken>> {
        let row = sqlx::query(SELECT_TOKEN_BY_SELECTOR)
            .bind(selector)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", SELECT_TOKEN_BY_SELECTOR))
            .await
            .context("failed to lookup refresh token")?;
        Ok(row.as_ref().map(token_from_row))
    }

    async fn find_tokens_by_user_id(&self, user_id: Uuid) -> Result<Vec<RefreshToken>> {
        let rows = sqlx::query(SELECT_TOKENS_BY_USER)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", SELECT_TOKENS_BY_USER))
            .await
            .context("failed to list refresh tokens")?;
        Ok(rows.iter().map(token_from_row).collect())
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh tokens for user")?;
        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        now: DateTime<Utc>,
        replacement: NewRefreshToken,
    ) -> Result<RotateOutcome> {
        let mut tx = self.pool.begin().await.context("begin rotation transaction")?;

        // The row lock taken here serializes concurrent rotations of the same parent;
        // the loser re-evaluates `revoked_at IS NULL` and updates nothing.
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
        ";
        let revoked = sqlx::query(query)
            .bind(old_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke rotated refresh token")?;

        if revoked.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Ok(RotateOutcome::ParentInactive);
        }

        match insert_token(&mut *tx, &replacement).await? {
            InsertOutcome::Created(child) => {
                tx.commit().await.context("commit rotation transaction")?;
                Ok(RotateOutcome::Rotated(child))
            }
            InsertOutcome::Conflict => {
                let _ = tx.rollback().await;
                Ok(RotateOutcome::SelectorTaken)
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
