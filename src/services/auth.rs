//! Authentication service
//!
//! - Password hashing with bcrypt
//! - Admin login from the settings document, other users from CONFIG_USERS
//! - In-memory bearer sessions for the web action endpoint

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::config::AppSettings;
use crate::db::UsersRepository;

/// Marks a stored password as a bcrypt hash
pub const HASH_PREFIX: &str = "[hash]";

const DEFAULT_ADMIN: &str = "admin";
const DEFAULT_PASSWORD: &str = "password";

fn bcrypt_cost() -> u32 {
    std::env::var("BCRYPT_COST")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_COST)
}

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    hash(password, bcrypt_cost()).map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Check a password against a stored value. The value may carry the
/// `[hash]` prefix or be a bare bcrypt hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let hashed = stored.strip_prefix(HASH_PREFIX).unwrap_or(stored);
    verify(password, hashed).unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub name: String,
    /// Comma separated menu privileges; the admin gets `all`
    pub pris: String,
    pub admin: bool,
}

/// Check a login against the admin account and then the user table
pub async fn verify_login(
    settings: &AppSettings,
    users: &UsersRepository,
    name: &str,
    password: &str,
) -> Result<Option<AuthenticatedUser>> {
    if name.is_empty() || password.is_empty() {
        return Ok(None);
    }

    let admin_name = settings
        .app
        .login_user
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_ADMIN);
    if name == admin_name {
        let ok = match settings.app.login_password.as_deref().filter(|p| !p.is_empty()) {
            Some(stored) if stored.starts_with(HASH_PREFIX) => verify_password(password, stored),
            Some(plain) => plain == password,
            None => password == DEFAULT_PASSWORD,
        };
        return Ok(ok.then(|| AuthenticatedUser {
            name: name.to_string(),
            pris: "all".to_string(),
            admin: true,
        }));
    }

    let Some(user) = users.get(name).await? else {
        return Ok(None);
    };
    if !verify_password(password, &user.password) {
        return Ok(None);
    }
    Ok(Some(AuthenticatedUser {
        name: user.name,
        pris: user.pris,
        admin: false,
    }))
}

struct Session {
    user: AuthenticatedUser,
    expires_at: DateTime<Utc>,
}

/// Bearer tokens handed out by `/login`
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, user: AuthenticatedUser) -> String {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = Session {
            user,
            expires_at: now + self.ttl,
        };
        let mut sessions = self.sessions.write();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session);
        token
    }

    /// The session's user, dropping it when expired
    pub fn validate(&self, token: &str) -> Option<AuthenticatedUser> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read();
            match sessions.get(token) {
                Some(s) if s.expires_at > now => return Some(s.user.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().remove(token);
        None
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// Drop expired sessions, returning how many went
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop every session, used on logout of the admin
    pub fn clear(&self) {
        self.sessions.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_verify_password_accepts_prefixed_and_bare() {
        let hashed = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hashed));
        assert!(verify_password("s3cret", &format!("{}{}", HASH_PREFIX, hashed)));
        assert!(!verify_password("wrong", &hashed));
        assert!(!verify_password("s3cret", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_login_admin_and_table_user() {
        let db = Database::connect_in_memory().await.unwrap();
        let users = db.users();
        users
            .insert("guest", &hash_password("guestpw").unwrap(), "search,download")
            .await
            .unwrap();

        let mut settings = AppSettings::default();
        settings.app.login_user = Some("root".to_string());
        settings.app.login_password = Some(format!("{}{}", HASH_PREFIX, hash_password("rootpw").unwrap()));

        let admin = verify_login(&settings, &users, "root", "rootpw").await.unwrap().unwrap();
        assert!(admin.admin);
        assert!(verify_login(&settings, &users, "root", "bad").await.unwrap().is_none());

        let guest = verify_login(&settings, &users, "guest", "guestpw").await.unwrap().unwrap();
        assert_eq!(guest.pris, "search,download");
        assert!(verify_login(&settings, &users, "nobody", "x").await.unwrap().is_none());
    }

    #[test]
    fn test_sessions_expire() {
        let store = SessionStore::new(Duration::seconds(-1));
        let user = AuthenticatedUser {
            name: "a".to_string(),
            pris: String::new(),
            admin: false,
        };
        let token = store.issue(user.clone());
        assert!(store.validate(&token).is_none());

        let store = SessionStore::default();
        let token = store.issue(user.clone());
        assert_eq!(store.validate(&token), Some(user));
        assert!(store.revoke(&token));
        assert!(store.validate(&token).is_none());
    }

    #[test]
    fn test_expired_sessions_are_pruned() {
        let user = AuthenticatedUser {
            name: "a".to_string(),
            pris: String::new(),
            admin: false,
        };
        let expired = SessionStore::new(Duration::seconds(-1));
        for _ in 0..100 {
            expired.issue(user.clone());
        }
        // Each issue clears what came before it
        assert_eq!(expired.len(), 1);
        assert_eq!(expired.prune_expired(), 1);
        assert!(expired.is_empty());

        let live = SessionStore::default();
        let token = live.issue(user.clone());
        live.issue(user.clone());
        assert_eq!(live.prune_expired(), 0);
        assert_eq!(live.len(), 2);
        assert_eq!(live.validate(&token), Some(user));
    }
}
