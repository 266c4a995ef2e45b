//! OAuth2 authenticator.
//!
//! Two grants are supported: the installed-application authorization code
//! exchange (the user pastes a code obtained from [`Authenticator::authorization_url`])
//! and refresh-token exchange. Any new refresh token in a token response is
//! written to the [`RefreshTokenStore`] before the grant is returned. A failed
//! write is logged and the grant is still returned: the file only spares
//! the next run an authorization round.

use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use symsrv_core::SymbolError;
use symsrv_fetch::{Connector, PostData, Transport, TransportError, escape};
use symsrv_store::{OAuthSettings, RefreshTokenStore, StoreError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Redirect URI for the copy/paste installed-application flow.
pub const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

// ============================================================================
// Errors
// ============================================================================

/// Errors from a token exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The token endpoint answered with an error status.
    #[error("Token endpoint returned HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// `error_description`, `error`, or the raw body.
        message: String,
    },

    /// A successful response carried no access token.
    #[error("Token response contains no access_token")]
    MissingAccessToken,

    /// The response body was not a JSON object.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// The stored refresh token could not be read.
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthError> for SymbolError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(e) => e.into(),
            other => SymbolError::AuthFailed(other.to_string()),
        }
    }
}

// ============================================================================
// Configuration and Grants
// ============================================================================

/// OAuth client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    /// Client ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_server: String,
    /// Token endpoint.
    pub token_server: String,
    /// Requested scope.
    pub scope: String,
}

impl From<&OAuthSettings> for OAuthConfig {
    fn from(settings: &OAuthSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            auth_server: settings.auth_server.clone(),
            token_server: settings.token_server.clone(),
            scope: settings.scope.clone(),
        }
    }
}

/// Credentials returned by a token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Bearer token for storage requests.
    pub access_token: String,
    /// Replacement refresh token, if the server issued one.
    pub refresh_token: Option<String>,
    /// Access token lifetime.
    pub expires_in: Option<Duration>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Parses a token endpoint response.
///
/// # Errors
///
/// - `Rejected` for a non-2xx status
/// - `InvalidResponse` for a 2xx body that is not a JSON object
/// - `MissingAccessToken` when `access_token` is absent or empty
pub fn parse_token_response(status: u16, body: &[u8]) -> Result<TokenGrant, AuthError> {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .as_ref()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        return Err(AuthError::Rejected { status, message });
    }

    let Some(Value::Object(fields)) = parsed else {
        return Err(AuthError::InvalidResponse(
            String::from_utf8_lossy(body).trim().to_string(),
        ));
    };

    let access_token = fields
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingAccessToken)?
        .to_string();
    let refresh_token = fields
        .get("refresh_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let expires_in = fields.get("expires_in").and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });

    Ok(TokenGrant {
        access_token,
        refresh_token,
        expires_in: expires_in.map(Duration::from_secs),
    })
}

// ============================================================================
// Authenticator
// ============================================================================

/// Performs OAuth2 exchanges and persists refresh tokens.
pub struct Authenticator {
    config: OAuthConfig,
    connector: Rc<dyn Connector>,
    token_store: RefreshTokenStore,
    timeout: Option<Duration>,
}

impl Authenticator {
    /// Creates an authenticator.
    pub fn new(
        config: OAuthConfig,
        connector: Rc<dyn Connector>,
        token_store: RefreshTokenStore,
    ) -> Self {
        Self {
            config,
            connector,
            token_store,
            timeout: None,
        }
    }

    /// Sets a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Client configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Where refresh tokens are persisted.
    pub fn token_store(&self) -> &RefreshTokenStore {
        &self.token_store
    }

    /// URL the user opens to obtain an authorization code.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={REDIRECT_URI}&response_type=code&scope={}",
            self.config.auth_server,
            escape(&self.config.client_id),
            escape(&self.config.scope),
        )
    }

    /// Reads the persisted refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Store` if the file exists but cannot be read.
    pub async fn load_refresh_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.token_store.load().await?)
    }

    /// Exchanges an authorization code for credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the exchange fails or the response is unusable.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        info!("Exchanging authorization code");
        let form = PostData::form([
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ]);
        self.request_token(form).await
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the exchange fails or the response is unusable.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        info!("Refreshing access token");
        let form = PostData::form([
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ]);
        self.request_token(form).await
    }

    async fn request_token(&self, form: PostData) -> Result<TokenGrant, AuthError> {
        let mut transport = Transport::new(Rc::clone(&self.connector))?;
        transport
            .set_url(self.config.token_server.clone())
            .set_post_data(form);
        if let Some(timeout) = self.timeout {
            transport.set_timeout(timeout);
        }

        let response = transport.perform().await?;
        let grant = parse_token_response(response.status, &response.body).inspect_err(|e| {
            warn!(status = response.status, error = %e, "Token exchange failed");
        })?;

        if let Some(refresh_token) = &grant.refresh_token {
            if let Err(e) = self.token_store.save(refresh_token).await {
                warn!(
                    path = %self.token_store.path().display(),
                    error = %e,
                    "Failed to persist refresh token"
                );
            }
        }
        debug!(
            expires_in = ?grant.expires_in,
            new_refresh_token = grant.refresh_token.is_some(),
            "Token exchange succeeded"
        );
        Ok(grant)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("client_id", &self.config.client_id)
            .field("token_server", &self.config.token_server)
            .field("token_store", &self.token_store)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
