//! PostgreSQL Repository Implementations

use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel::id::{SessionId, UserId};
use platform::password::HashedPassword;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::application::store_call::expires_after;
use crate::domain::entity::{
    blacklist_entry::BlacklistEntry,
    client::OAuthClient,
    credential::{AttemptReservation, Credential, LockoutPolicy},
    refresh_token::{ConsumeOutcome, RefreshToken, RefreshTokenRotation},
    two_factor_challenge::TwoFactorChallenge,
    user::User,
};
use crate::domain::repository::{
    AccessTokenBlacklistRepository, ClientRegistry, CredentialRepository, RefreshTokenRepository,
    TwoFactorChallengeRepository, UserRepository,
};
use crate::domain::value_object::{
    auth_policy::AuthPolicy, email::Email, totp_secret::TotpSecret,
};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock a refresh token row for the rest of the transaction
    async fn lock_refresh_token(
        tx: &mut Transaction<'_, Postgres>,
        token_hash: &str,
    ) -> AuthResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT
                token_hash,
                user_id,
                session_id,
                client_id,
                issued_at,
                expires_at,
                revoked,
                revoked_at,
                replaced_by
            FROM refresh_tokens
            WHERE token_hash = $1
            FOR UPDATE
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|r| r.into_refresh_token()))
    }
}

// ============================================================================
// Client Registry Implementation
// ============================================================================

impl ClientRegistry for PgAuthRepository {
    async fn find_active_client(&self, client_id: &str) -> AuthResult<Option<OAuthClient>> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT client_id, properties, is_active
            FROM oauth_clients
            WHERE client_id = $1 AND is_active
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_client()))
    }

    async fn save_client(&self, client: &OAuthClient) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_clients (client_id, properties, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            ON CONFLICT (client_id) DO UPDATE SET
                properties = EXCLUDED.properties,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.properties)
        .bind(client.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_auth_policy(&self, client_id: &str, policy: &AuthPolicy) -> AuthResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Row lock keeps concurrent edits of other properties from being lost
        let properties = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT properties
            FROM oauth_clients
            WHERE client_id = $1 AND is_active
            FOR UPDATE
            "#,
        )
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(properties) = properties else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE oauth_clients SET
                properties = $2,
                updated_at = now()
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .bind(policy.merge_into(properties.as_deref()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgAuthRepository {
    async fn create_user(&self, user: &User, credential: &Credential) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                email,
                email_verified,
                roles,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(user.email_verified)
        .bind(&user.roles)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    AuthError::EmailAlreadyRegistered
                }
                e => e.into(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO credentials (
                user_id,
                password_hash,
                totp_secret,
                totp_enabled,
                failed_attempts,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(credential.user_id.as_uuid())
        .bind(credential.password_hash.as_phc_string())
        .bind(credential.totp_secret.as_ref().map(|s| s.as_base32()))
        .bind(credential.totp_enabled)
        .bind(credential.failed_attempts as i32)
        .bind(credential.last_failed_at)
        .bind(credential.locked_until)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, email, email_verified, roles, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, email, email_verified, roles, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }
}

// ============================================================================
// Credential Repository Implementation
// ============================================================================

impl CredentialRepository for PgAuthRepository {
    async fn find_credential(&self, user_id: &UserId) -> AuthResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT
                user_id,
                password_hash,
                totp_secret,
                totp_enabled,
                failed_attempts,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            FROM credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_credential()).transpose()
    }

    async fn reserve_login_attempt(
        &self,
        user_id: &UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<(Credential, AttemptReservation)>> {
        let lock_until = expires_after(now, policy.lockout_duration)?;

        // SET expressions see the old row, so both CASEs test the same count.
        // A locked row is not updated at all.
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            UPDATE credentials SET
                failed_attempts = CASE
                    WHEN failed_attempts + 1 >= $2 THEN 0
                    ELSE failed_attempts + 1
                END,
                locked_until = CASE
                    WHEN failed_attempts + 1 >= $2 THEN $4
                    ELSE NULL
                END,
                last_failed_at = $3,
                updated_at = $3
            WHERE user_id = $1
              AND (locked_until IS NULL OR locked_until <= $3)
            RETURNING
                user_id,
                password_hash,
                totp_secret,
                totp_enabled,
                failed_attempts,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(policy.max_failed_attempts as i32)
        .bind(now)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let credential = row.into_credential()?;
            let locks_account = credential.locked_until.is_some();
            return Ok(Some((credential, AttemptReservation::Granted { locks_account })));
        }

        // No row updated: either no credential or a live lockout
        let Some(credential) = self.find_credential(user_id).await? else {
            return Ok(None);
        };
        let retry_after = credential.lockout_remaining(now).unwrap_or(Duration::ZERO);
        Ok(Some((credential, AttemptReservation::Locked { retry_after })))
    }

    async fn reset_failed_attempts(&self, user_id: &UserId, clear_lockout: bool) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE credentials SET
                failed_attempts = 0,
                last_failed_at = NULL,
                locked_until = CASE WHEN $2 THEN NULL ELSE locked_until END,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(clear_lockout)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_totp(
        &self,
        user_id: &UserId,
        secret: Option<&TotpSecret>,
        enabled: bool,
    ) -> AuthResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE credentials SET
                totp_secret = $2,
                totp_enabled = $3,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(secret.map(|s| s.as_base32()))
        .bind(enabled && secret.is_some())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AuthError::Internal("Credential record missing".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Two-Factor Challenge Repository Implementation
// ============================================================================

impl TwoFactorChallengeRepository for PgAuthRepository {
    async fn insert_challenge(&self, challenge: &TwoFactorChallenge) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_challenges (
                token_hash,
                user_id,
                client_id,
                expires_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&challenge.token_hash)
        .bind(challenge.user_id.as_uuid())
        .bind(&challenge.client_id)
        .bind(challenge.expires_at)
        .bind(challenge.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_challenge(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<TwoFactorChallenge>> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            DELETE FROM two_factor_challenges
            WHERE token_hash = $1
            RETURNING token_hash, user_id, client_id, expires_at, created_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| r.into_challenge())
            .filter(|challenge| !challenge.is_expired(now)))
    }

    async fn prune_challenges(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM two_factor_challenges WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}

// ============================================================================
// Refresh Token Repository Implementation
// ============================================================================

impl RefreshTokenRepository for PgAuthRepository {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                token_hash,
                user_id,
                session_id,
                client_id,
                issued_at,
                expires_at,
                revoked,
                revoked_at,
                replaced_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.user_id.as_uuid())
        .bind(token.session_id.as_uuid())
        .bind(&token.client_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.revoked_at)
        .bind(&token.replaced_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT
                token_hash,
                user_id,
                session_id,
                client_id,
                issued_at,
                expires_at,
                revoked,
                revoked_at,
                replaced_by
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_refresh_token()))
    }

    async fn consume_refresh_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<ConsumeOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(mut token) = Self::lock_refresh_token(&mut tx, token_hash).await? else {
            return Ok(ConsumeOutcome::Invalid);
        };

        if token.user_id != *user_id {
            return Ok(ConsumeOutcome::Invalid);
        }
        if token.was_rotated() {
            return Ok(ConsumeOutcome::Reused(token));
        }
        if !token.is_active(now) {
            return Ok(ConsumeOutcome::Invalid);
        }

        token.revoke(now);
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $2 WHERE token_hash = $1")
            .bind(token_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ConsumeOutcome::Consumed(token))
    }

    async fn rotate_refresh_token(
        &self,
        user_id: &UserId,
        rotation: &RefreshTokenRotation,
    ) -> AuthResult<ConsumeOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(mut token) = Self::lock_refresh_token(&mut tx, &rotation.presented_hash).await?
        else {
            return Ok(ConsumeOutcome::Invalid);
        };

        if token.user_id != *user_id || token.session_id != rotation.session_id {
            return Ok(ConsumeOutcome::Invalid);
        }
        if token.was_rotated() {
            return Ok(ConsumeOutcome::Reused(token));
        }
        if !token.is_active(rotation.now) {
            return Ok(ConsumeOutcome::Invalid);
        }

        token.mark_rotated(&rotation.successor_hash, rotation.now);
        let successor = token.successor(
            rotation.successor_hash.clone(),
            rotation.now,
            rotation.expires_at,
        );

        sqlx::query(
            r#"
            UPDATE refresh_tokens SET
                revoked = TRUE,
                revoked_at = $2,
                replaced_by = $3
            WHERE token_hash = $1
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.revoked_at)
        .bind(&token.replaced_by)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                token_hash,
                user_id,
                session_id,
                client_id,
                issued_at,
                expires_at,
                revoked,
                revoked_at,
                replaced_by
            ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, NULL, NULL)
            "#,
        )
        .bind(&successor.token_hash)
        .bind(successor.user_id.as_uuid())
        .bind(successor.session_id.as_uuid())
        .bind(&successor.client_id)
        .bind(successor.issued_at)
        .bind(successor.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ConsumeOutcome::Consumed(successor))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $3
            WHERE token_hash = $1 AND user_id = $2 AND NOT revoked
            "#,
        )
        .bind(token_hash)
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(revoked > 0)
    }

    async fn revoke_session_tokens(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $3
            WHERE user_id = $1 AND session_id = $2 AND NOT revoked
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(revoked)
    }

    async fn revoke_user_tokens(&self, user_id: &UserId, now: DateTime<Utc>) -> AuthResult<u64> {
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $2
            WHERE user_id = $1 AND NOT revoked
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(revoked)
    }

    async fn prune_refresh_tokens(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}

// ============================================================================
// Access Token Blacklist Repository Implementation
// ============================================================================

impl AccessTokenBlacklistRepository for PgAuthRepository {
    async fn insert_blacklist_entry(&self, entry: &BlacklistEntry) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_token_blacklist (
                token_hash,
                user_id,
                blacklisted_at,
                expires_at
            ) VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(&entry.token_hash)
        .bind(entry.user_id.as_uuid())
        .bind(entry.blacklisted_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_blacklisted(&self, token_hash: &str, user_id: &UserId) -> AuthResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM access_token_blacklist WHERE token_hash = $1 AND user_id = $2)",
        )
        .bind(token_hash)
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn prune_blacklist(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM access_token_blacklist WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!(deleted, "Pruned access token blacklist");
        Ok(deleted)
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct ClientRow {
    client_id: String,
    properties: Option<String>,
    is_active: bool,
}

impl ClientRow {
    fn into_client(self) -> OAuthClient {
        OAuthClient {
            client_id: self.client_id,
            properties: self.properties,
            is_active: self.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    email_verified: bool,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            email_verified: self.email_verified,
            roles: self.roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    user_id: Uuid,
    password_hash: String,
    totp_secret: Option<String>,
    totp_enabled: bool,
    failed_attempts: i32,
    last_failed_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialRow {
    fn into_credential(self) -> AuthResult<Credential> {
        let password_hash = HashedPassword::from_phc_string(self.password_hash)
            .map_err(|e| AuthError::Internal(format!("Invalid password hash: {e}")))?;

        let totp_secret = self
            .totp_secret
            .map(TotpSecret::from_base32)
            .transpose()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {e}")))?;

        Ok(Credential {
            user_id: UserId::from_uuid(self.user_id),
            password_hash,
            totp_secret,
            totp_enabled: self.totp_enabled,
            failed_attempts: self.failed_attempts.max(0) as u32,
            last_failed_at: self.last_failed_at,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    token_hash: String,
    user_id: Uuid,
    client_id: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl ChallengeRow {
    fn into_challenge(self) -> TwoFactorChallenge {
        TwoFactorChallenge {
            token_hash: self.token_hash,
            user_id: UserId::from_uuid(self.user_id),
            client_id: self.client_id,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    token_hash: String,
    user_id: Uuid,
    session_id: Uuid,
    client_id: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    replaced_by: Option<String>,
}

impl RefreshTokenRow {
    fn into_refresh_token(self) -> RefreshToken {
        RefreshToken {
            token_hash: self.token_hash,
            user_id: UserId::from_uuid(self.user_id),
            session_id: SessionId::from_uuid(self.session_id),
            client_id: self.client_id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            revoked: self.revoked,
            revoked_at: self.revoked_at,
            replaced_by: self.replaced_by,
        }
    }
}
