//! In-process identity provider.
//!
//! Accounts live in memory for the lifetime of the process. Tokens have the
//! form `base64url(uid|email|expiry).base64url(mac)`, where `mac` is a BLAKE3
//! keyed hash of the payload under a key derived from the configured secret.
//! Token MACs and password hashes are compared in constant time.

use super::{AuthSession, Claims, IdentityError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use subtle::ConstantTimeEq;

const TOKEN_CONTEXT: &str = "devquest local identity 2024 token mac";
const PASSWORD_CONTEXT: &str = "devquest local identity 2024 password hash";

/// Shortest password accepted, matching Firebase's rule.
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone)]
struct LocalAccount {
    uid: String,
    email: String,
    password_hash: [u8; 32],
}

/// Local accounts and token signing.
pub struct LocalIdentity {
    token_key: [u8; 32],
    password_key: [u8; 32],
    ttl_secs: u64,
    accounts: Mutex<BTreeMap<String, LocalAccount>>,
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl LocalIdentity {
    /// Create a provider signing with keys derived from `secret`.
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            token_key: blake3::derive_key(TOKEN_CONTEXT, secret.as_bytes()),
            password_key: blake3::derive_key(PASSWORD_CONTEXT, secret.as_bytes()),
            ttl_secs,
            accounts: Mutex::new(BTreeMap::new()),
        }
    }

    fn accounts(&self) -> MutexGuard<'_, BTreeMap<String, LocalAccount>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn normalize(email: &str) -> String {
        email.trim().to_ascii_lowercase()
    }

    fn uid_for(email: &str) -> String {
        let hex = blake3::hash(email.as_bytes()).to_hex();
        hex.as_str()[..28].to_string()
    }

    fn password_hash(&self, email: &str, password: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.password_key);
        hasher.update(email.as_bytes());
        hasher.update(&[0]);
        hasher.update(password.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Sign a token for `uid` valid until `now + ttl`.
    pub fn issue_token(&self, uid: &str, email: &str, now: DateTime<Utc>) -> String {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let expiry = now.timestamp().saturating_add(ttl);
        let payload = format!("{}|{}|{}", uid, email, expiry);
        let mac = blake3::keyed_hash(&self.token_key, payload.as_bytes());
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(mac.as_bytes())
        )
    }

    /// Check a token's signature and expiry.
    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, IdentityError> {
        let invalid = |reason: &str| IdentityError::InvalidToken(reason.to_string());

        let (payload_b64, mac_b64) = token.split_once('.').ok_or_else(|| invalid("formato"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid("formato"))?;
        let provided = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|_| invalid("formato"))?;

        let expected = blake3::keyed_hash(&self.token_key, &payload);
        if !bool::from(expected.as_bytes().as_slice().ct_eq(provided.as_slice())) {
            return Err(invalid("firma"));
        }

        let payload = String::from_utf8(payload).map_err(|_| invalid("formato"))?;
        let (uid, rest) = payload.split_once('|').ok_or_else(|| invalid("formato"))?;
        let (email, expiry) = rest.rsplit_once('|').ok_or_else(|| invalid("formato"))?;
        let expiry: i64 = expiry.parse().map_err(|_| invalid("formato"))?;
        if expiry <= now.timestamp() {
            return Err(invalid("expirado"));
        }

        Ok(Claims {
            uid: uid.to_string(),
            email: email.to_string(),
        })
    }

    /// Register an account.
    pub fn create_user(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, IdentityError> {
        let email = Self::normalize(email);
        if !email.contains('@') {
            return Err(IdentityError::Rejected("INVALID_EMAIL".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(IdentityError::Rejected(format!(
                "WEAK_PASSWORD : Password should be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let account = LocalAccount {
            uid: Self::uid_for(&email),
            email: email.clone(),
            password_hash: self.password_hash(&email, password),
        };
        {
            let mut accounts = self.accounts();
            if accounts.contains_key(&email) {
                return Err(IdentityError::Rejected("EMAIL_EXISTS".to_string()));
            }
            accounts.insert(email, account.clone());
        }

        Ok(AuthSession {
            token: self.issue_token(&account.uid, &account.email, now),
            uid: account.uid,
            email: account.email,
        })
    }

    /// Sign in with email and password.
    pub fn sign_in(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, IdentityError> {
        let email = Self::normalize(email);
        let account = self
            .accounts()
            .get(&email)
            .cloned()
            .ok_or(IdentityError::InvalidCredentials)?;

        let attempt = self.password_hash(&email, password);
        if !bool::from(attempt.as_slice().ct_eq(account.password_hash.as_slice())) {
            return Err(IdentityError::InvalidCredentials);
        }

        Ok(AuthSession {
            token: self.issue_token(&account.uid, &account.email, now),
            uid: account.uid,
            email: account.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn provider() -> LocalIdentity {
        LocalIdentity::new("test-secret", 3600)
    }

    #[test]
    fn issued_token_verifies() {
        let id = provider();
        let now = Utc::now();
        let token = id.issue_token("uid1", "a|b@devquest.test", now);
        let claims = id.verify_token(&token, now).expect("verify");
        assert_eq!(claims.uid, "uid1");
        assert_eq!(claims.email, "a|b@devquest.test");
    }

    #[test]
    fn expired_token_is_rejected() {
        let id = provider();
        let now = Utc::now();
        let token = id.issue_token("uid1", "a@devquest.test", now);
        let later = now + Duration::seconds(3601);
        assert!(matches!(
            id.verify_token(&token, later),
            Err(IdentityError::InvalidToken(reason)) if reason == "expirado"
        ));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let now = Utc::now();
        let token = LocalIdentity::new("other", 3600).issue_token("uid1", "a@b.c", now);
        assert!(provider().verify_token(&token, now).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let id = provider();
        let now = Utc::now();
        let token = id.issue_token("uid1", "a@b.c", now);
        let (_, mac) = token.split_once('.').expect("dot");
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(format!("admin|a@b.c|{}", now.timestamp() + 100)),
            mac
        );
        assert!(id.verify_token(&forged, now).is_err());
        assert!(id.verify_token("invalid_token", now).is_err());
        assert!(id.verify_token("", now).is_err());
    }

    #[test]
    fn register_then_sign_in() {
        let id = provider();
        let now = Utc::now();
        let created = id.create_user("Ana@DevQuest.test", "secreto1", now).expect("create");
        assert_eq!(created.email, "ana@devquest.test");
        assert_eq!(created.uid.len(), 28);

        let session = id.sign_in("ana@devquest.test", "secreto1", now).expect("sign in");
        assert_eq!(session.uid, created.uid);
        assert!(matches!(
            id.sign_in("ana@devquest.test", "wrong-password", now),
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            id.sign_in("nobody@devquest.test", "secreto1", now),
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_and_weak_registrations_are_rejected() {
        let id = provider();
        let now = Utc::now();
        id.create_user("ana@devquest.test", "secreto1", now).expect("create");
        assert!(matches!(
            id.create_user("ana@devquest.test", "secreto2", now),
            Err(IdentityError::Rejected(msg)) if msg == "EMAIL_EXISTS"
        ));
        assert!(matches!(
            id.create_user("bob@devquest.test", "123", now),
            Err(IdentityError::Rejected(msg)) if msg.starts_with("WEAK_PASSWORD")
        ));
        assert!(matches!(
            id.create_user("not-an-email", "secreto1", now),
            Err(IdentityError::Rejected(_))
        ));
    }
}
