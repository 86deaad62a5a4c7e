//! Thin identity adapter. Account provisioning and login UX live outside
//! this service; all the booking core needs is "resolve the current
//! authenticated principal", which is a server-side session lookup keyed by
//! a random bearer token delivered in the `session` cookie.

use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::SqlitePool;
use uuid::Uuid;

pub mod session;

use crate::error::Result;
use session::{Session, SessionStore};

pub struct AuthService {
    session_store: SessionStore,
}

impl AuthService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            session_store: SessionStore::new(pool),
        }
    }

    /// Mint a session for a user and return the bearer token the client
    /// stores. Only the SHA-256 of the token ever hits the database.
    pub async fn create_session(&self, user_id: Uuid, duration_hours: i64) -> Result<(Session, String)> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::hours(duration_hours);

        let session = self.session_store.create(user_id, &token, expires_at).await?;

        Ok((session, token))
    }

    pub async fn validate_session(&self, token: &str) -> Result<Option<Session>> {
        self.session_store.find_by_token(token).await
    }

    pub async fn delete_session(&self, token: &str) -> Result<()> {
        self.session_store.delete_by_token(token).await
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
