//! Firebase Identity Toolkit client.
//!
//! Uses the public REST endpoints with the project's Web API key:
//! `accounts:signInWithPassword`, `accounts:signUp` and `accounts:lookup`.

use super::{AuthSession, Claims, IdentityError};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Identity Toolkit v1 base URL.
pub const FIREBASE_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Upper bound on establishing the TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    local_id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

/// Extract `error.message` from an Identity Toolkit error body.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Identity Toolkit REST client.
#[derive(Clone)]
pub struct FirebaseIdentity {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for FirebaseIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseIdentity")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl FirebaseIdentity {
    /// Create a client for the given API key and base URL.
    ///
    /// Every call is bounded by `timeout`, connecting included.
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .build()
            .map_err(|e| IdentityError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn unavailable(&self, err: &reqwest::Error) -> IdentityError {
        if err.is_timeout() {
            tracing::warn!(base_url = %self.base_url, "Identity provider timed out");
            IdentityError::Unavailable(format!("{}: timeout", self.base_url))
        } else {
            IdentityError::Unavailable(format!("{}: {err}", self.base_url))
        }
    }

    /// POST `body` to `accounts:{method}`; returns the status and raw body.
    async fn call(&self, method: &str, body: &Value) -> Result<(u16, String), IdentityError> {
        let url = format!("{}/accounts:{}", self.base_url, method);
        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| self.unavailable(&e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.unavailable(&e))?;
        if status.is_server_error() {
            return Err(IdentityError::Unavailable(format!(
                "{} ({})",
                provider_message(&text),
                status.as_u16()
            )));
        }
        Ok((status.as_u16(), text))
    }

    fn parse<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, IdentityError> {
        serde_json::from_str(text)
            .map_err(|e| IdentityError::Unavailable(format!("Unexpected provider response: {e}")))
    }

    /// `accounts:signInWithPassword`
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let body = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let (status, text) = self.call("signInWithPassword", &body).await?;
        if status != 200 {
            tracing::debug!(reason = %provider_message(&text), "Firebase sign-in refused");
            return Err(IdentityError::InvalidCredentials);
        }
        let token: TokenResponse = Self::parse(&text)?;
        Ok(AuthSession {
            uid: token.local_id,
            email: if token.email.is_empty() {
                email.to_string()
            } else {
                token.email
            },
            token: token.id_token,
        })
    }

    /// `accounts:signUp`
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthSession, IdentityError> {
        let body = json!({
            "email": email,
            "password": password,
            "displayName": display_name,
            "returnSecureToken": true,
        });
        let (status, text) = self.call("signUp", &body).await?;
        if status != 200 {
            return Err(IdentityError::Rejected(provider_message(&text)));
        }
        let token: TokenResponse = Self::parse(&text)?;
        Ok(AuthSession {
            uid: token.local_id,
            email: email.to_string(),
            token: token.id_token,
        })
    }

    /// `accounts:lookup`: resolve an ID token to its account.
    pub async fn lookup(&self, id_token: &str) -> Result<Claims, IdentityError> {
        let (status, text) = self.call("lookup", &json!({ "idToken": id_token })).await?;
        if status != 200 {
            return Err(IdentityError::InvalidToken(provider_message(&text)));
        }
        let lookup: LookupResponse = Self::parse(&text)?;
        let user = lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::InvalidToken("USER_NOT_FOUND".to_string()))?;
        Ok(Claims {
            uid: user.local_id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, timeout: Duration) -> FirebaseIdentity {
        FirebaseIdentity::new("k".to_string(), base_url.to_string(), timeout).expect("client")
    }

    #[test]
    fn provider_message_reads_error_body() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS","errors":[]}}"#;
        assert_eq!(provider_message(body), "EMAIL_EXISTS");
        assert_eq!(provider_message("  gateway timeout "), "gateway timeout");
    }

    #[test]
    fn token_response_parses_camel_case() {
        let body = r#"{"idToken":"abc","localId":"uid-1","email":"a@b.c","expiresIn":"3600"}"#;
        let token: TokenResponse = FirebaseIdentity::parse(body).expect("parse");
        assert_eq!(token.id_token, "abc");
        assert_eq!(token.local_id, "uid-1");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = FirebaseIdentity::new(
            "secret-key".to_string(),
            "http://127.0.0.1:1/v1/".to_string(),
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(client.base_url, "http://127.0.0.1:1/v1");
        assert!(!format!("{:?}", client).contains("secret-key"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_unavailable() {
        let client = client("http://127.0.0.1:9", Duration::from_secs(1));
        let result = client.sign_in("a@b.c", "secreto1").await;
        assert!(matches!(result, Err(IdentityError::Unavailable(_))));
    }

    #[tokio::test]
    async fn silent_provider_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = client(&format!("http://{addr}/v1"), Duration::from_millis(300));
        let result = tokio::time::timeout(Duration::from_secs(5), client.lookup("tok"))
            .await
            .expect("lookup must not hang");
        assert!(
            matches!(&result, Err(IdentityError::Unavailable(msg)) if msg.contains("timeout")),
            "got {result:?}"
        );
        silent.abort();
    }
}
