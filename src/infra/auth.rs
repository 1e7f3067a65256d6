//! Auth provider adapter: asks the NextAuth session endpoint who owns a token.

use async_trait::async_trait;
use gymdesk_api_types::SessionPayload;
use reqwest::{Client, StatusCode, Url, header};
use tracing::debug;

use crate::application::session::{AuthProvider, AuthProviderError, SessionToken};
use crate::config::AuthSettings;

use super::error::InfraError;

const SESSION_ENDPOINT: &[&str] = &["api", "auth", "session"];

#[derive(Clone, Debug)]
pub struct NextAuthProvider {
    client: Client,
    endpoint: Url,
    cookie_name: String,
}

impl NextAuthProvider {
    pub fn new(settings: &AuthSettings, client: Client) -> Result<Self, InfraError> {
        let mut endpoint = settings.url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|()| InfraError::configuration("auth.url cannot be used as a base URL"))?
            .pop_if_empty()
            .extend(SESSION_ENDPOINT);
        Ok(Self {
            client,
            endpoint,
            cookie_name: settings.session_cookie.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AuthProvider for NextAuthProvider {
    async fn current_session(
        &self,
        token: &SessionToken,
    ) -> Result<Option<SessionPayload>, AuthProviderError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .header(
                header::COOKIE,
                format!("{}={}", self.cookie_name, token.expose()),
            )
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| AuthProviderError::Transport(err.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Ok(None);
            }
            status if !status.is_success() => {
                return Err(AuthProviderError::Status {
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| AuthProviderError::Transport(err.to_string()))?;
        // NextAuth answers `{}`, `null` or nothing when the cookie carries no session.
        let payload: Option<SessionPayload> = if bytes.trim_ascii().is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|err| AuthProviderError::Decode(err.to_string()))?
        };
        let payload = payload.filter(|payload| payload.user.is_some());
        debug!(
            target = "gymdesk::auth",
            found = payload.is_some(),
            "session lookup finished"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;
    use crate::config::Secret;

    fn provider(server: &MockServer) -> NextAuthProvider {
        let settings = AuthSettings {
            url: Url::parse(&server.base_url()).unwrap(),
            secret: test_secret(),
            session_cookie: "next-auth.session-token".to_string(),
        };
        NextAuthProvider::new(&settings, Client::new()).unwrap()
    }

    fn test_secret() -> Secret {
        Secret::from("0123456789abcdef0123456789abcdef".to_string())
    }

    #[tokio::test]
    async fn forwards_token_as_session_cookie() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/api/auth/session")
                .header("cookie", "next-auth.session-token=tok-1");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"user":{"id":"u-7","email":"a@b.co","name":"Ana","role":"admin"},"expires":"2099-01-01T00:00:00Z"}"#);
        });

        let payload = provider(&server)
            .current_session(&SessionToken::new("tok-1").unwrap())
            .await
            .unwrap()
            .expect("session present");
        mock.assert();
        let user = payload.user.unwrap();
        assert_eq!(user.id, "u-7");
        assert_eq!(user.role, "admin");
        assert!(payload.expires.is_some());
    }

    #[tokio::test]
    async fn empty_object_means_no_session() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/auth/session");
            then.status(200)
                .header("content-type", "application/json")
                .body("{}");
        });

        let payload = provider(&server)
            .current_session(&SessionToken::new("stale").unwrap())
            .await
            .unwrap();
        assert!(payload.is_none());
    }

    #[tokio::test]
    async fn blank_body_means_no_session() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/auth/session");
            then.status(200).body(" \n");
        });

        let payload = provider(&server)
            .current_session(&SessionToken::new("stale").unwrap())
            .await
            .unwrap();
        assert!(payload.is_none());
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/auth/session");
            then.status(502);
        });

        let err = provider(&server)
            .current_session(&SessionToken::new("tok").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthProviderError::Status { status: 502 }));
    }
}
