use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "admin-session";

// Password digest, never the plain password
fn digest(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
}

// admin password check plus the table of live session tokens
pub struct AdminSessions {
    password_digest: Option<[u8; 32]>,
    sessions: DashMap<String, DateTime<Utc>>, // token -> expiry
    ttl: TimeDelta,
    secure: bool,
}

impl AdminSessions {
    pub fn new(password: Option<&str>, ttl: Duration) -> Self {
        Self {
            password_digest: password.filter(|p| !p.is_empty()).map(digest),
            sessions: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            secure: false,
        }
    }

    // only send the cookie over https
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.password_digest.is_some()
    }

    // digest compare, same cost for any wrong password
    pub fn verify_password(&self, candidate: &str) -> bool {
        let Some(expected) = self.password_digest else {
            return false;
        };
        let actual = digest(candidate);
        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    pub fn create(&self) -> String {
        let now = Utc::now();
        // drop tokens that expired without ever being presented again
        self.sessions.retain(|_, expiry| *expiry > now);

        let token = Uuid::new_v4().simple().to_string();
        let expiry = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.sessions.insert(token.clone(), expiry);
        token
    }

    // Set-Cookie value carrying a session token
    pub fn cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
            self.ttl.num_seconds()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_valid(&self, token: &str) -> bool {
        let now = Utc::now();
        match self.sessions.get(token).map(|e| *e.value()) {
            Some(expiry) if expiry > now => true,
            Some(_) => {
                self.sessions.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.remove(token);
    }
}
