//! Session Bootstrap
//!
//! Three-stage login against the control plane:
//!
//! 1. `POST /api/sessions` with email/password yields a session token (cookie scope)
//! 2. `GET /api/me` with the session cookie yields the identity (user, accounts, org)
//! 3. `POST /api/access_tokens` with the session cookie yields a bearer token
//!
//! Results are cached for the lifetime of the [`SessionManager`]. The cache
//! check and all three stages run under one lock, so concurrent callers
//! never log in twice. A failed stage leaves earlier stages cached and the
//! next call resumes from the first missing artifact.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::transport::{dispatch, Auth, CallContext, HttpRequest, HttpTransport};
use crate::types::{Account, Organization, User};

/// Cookie-scoped session token
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Bearer token for mutations and data-plane calls
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// The authenticated user's profile
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub user: User,
    /// Primary account, owner of the authenticated user
    pub account: Account,
    pub organization: Organization,
    pub accounts: Vec<Account>,
}

impl Identity {
    pub fn primary_account(&self) -> &Account {
        &self.account
    }

    /// Resolve the account a call is scoped to; `None` means the primary account
    pub fn account(&self, account_id: Option<&str>) -> Result<&Account> {
        match account_id {
            None => Ok(&self.account),
            Some(id) if id == self.account.id => Ok(&self.account),
            Some(id) => self
                .accounts
                .iter()
                .find(|a| a.id == id)
                .ok_or_else(|| Error::not_found("account", id)),
        }
    }

    pub fn account_by_name(&self, name: &str) -> Option<&Account> {
        if self.account.name == name {
            return Some(&self.account);
        }
        self.accounts.iter().find(|a| a.name == name)
    }
}

/// A fully populated credential set
#[derive(Debug, Clone)]
pub struct Credentials {
    pub session: SessionToken,
    pub identity: Arc<Identity>,
    pub access_token: AccessToken,
}

#[derive(Default)]
struct CachedCredentials {
    session: Option<SessionToken>,
    identity: Option<Arc<Identity>>,
    access_token: Option<AccessToken>,
}

impl CachedCredentials {
    fn complete(&self) -> Option<Credentials> {
        Some(Credentials {
            session: self.session.clone()?,
            identity: self.identity.clone()?,
            access_token: self.access_token.clone()?,
        })
    }
}

// ============================================================
// API Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

fn has_error(error: &Option<Value>) -> bool {
    !matches!(error, None | Some(Value::Null))
}

// ============================================================
// Session Manager
// ============================================================

/// Owns the login pipeline and the cached credential triple
pub struct SessionManager {
    api_endpoint: String,
    email: String,
    password: String,
    transport: Arc<dyn HttpTransport>,
    cache: Mutex<CachedCredentials>,
}

impl SessionManager {
    pub fn new(config: &ProviderConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            password: config.password.clone(),
            transport,
            cache: Mutex::new(CachedCredentials::default()),
        }
    }

    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// Make sure session, identity and access token are cached.
    ///
    /// Returns immediately without network traffic once all three exist.
    pub async fn ensure_ready(&self, ctx: &CallContext) -> Result<Credentials> {
        let mut cache = self.cache.lock().await;
        if let Some(credentials) = cache.complete() {
            return Ok(credentials);
        }

        debug!("Bootstrapping Confluent Cloud session");

        let session = match &cache.session {
            Some(session) => session.clone(),
            None => {
                let session = self.login(ctx).await?;
                cache.session = Some(session.clone());
                session
            }
        };

        let identity = match &cache.identity {
            Some(identity) => Arc::clone(identity),
            None => {
                let identity = Arc::new(self.fetch_identity(ctx, &session).await?);
                cache.identity = Some(Arc::clone(&identity));
                identity
            }
        };

        let access_token = match &cache.access_token {
            Some(token) => token.clone(),
            None => {
                let token = self.mint_access_token(ctx, &session).await?;
                cache.access_token = Some(token.clone());
                token
            }
        };

        info!(
            account_id = %identity.account.id,
            organization_id = identity.organization.id,
            "Confluent Cloud session ready"
        );

        Ok(Credentials {
            session,
            identity,
            access_token,
        })
    }

    /// Drop all cached credentials; the next call logs in again
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        *cache = CachedCredentials::default();
        warn!("Confluent Cloud credentials invalidated");
    }

    async fn login(&self, ctx: &CallContext) -> Result<SessionToken> {
        let request = HttpRequest::post(format!("{}/api/sessions", self.api_endpoint))
            .with_json(&LoginRequest {
                email: &self.email,
                password: &self.password,
            })?;

        let response = dispatch(self.transport.as_ref(), ctx, request).await?;
        if matches!(response.status, 401 | 403) {
            return Err(Error::authentication(format!(
                "login rejected (HTTP {})",
                response.status
            )));
        }
        let response = response.expect_status(200, "logging in")?;
        let body: SessionResponse = response.json("login response")?;

        if has_error(&body.error) || body.token.is_empty() {
            return Err(Error::authentication(format!(
                "login rejected: {}",
                body.error.unwrap_or(Value::Null)
            )));
        }

        info!("Logged in to Confluent Cloud");
        Ok(SessionToken::new(body.token))
    }

    async fn fetch_identity(&self, ctx: &CallContext, session: &SessionToken) -> Result<Identity> {
        let request = HttpRequest::get(format!("{}/api/me", self.api_endpoint))
            .with_auth(Auth::Session(session.clone()));

        let response = dispatch(self.transport.as_ref(), ctx, request).await?;
        if matches!(response.status, 401 | 403) {
            return Err(Error::authentication(format!(
                "session rejected while loading profile (HTTP {})",
                response.status
            )));
        }
        let identity: Identity = response
            .expect_status(200, "loading profile")?
            .json("profile")?;

        debug!(
            account_id = %identity.account.id,
            accounts = identity.accounts.len(),
            "Loaded profile"
        );
        Ok(identity)
    }

    async fn mint_access_token(
        &self,
        ctx: &CallContext,
        session: &SessionToken,
    ) -> Result<AccessToken> {
        let request = HttpRequest::post(format!("{}/api/access_tokens", self.api_endpoint))
            .with_auth(Auth::Session(session.clone()))
            .with_json(&serde_json::json!({}))?;

        let response = dispatch(self.transport.as_ref(), ctx, request).await?;
        if response.status != 200 {
            return Err(Error::authentication(format!(
                "access token request returned HTTP {}: {}",
                response.status,
                response.text()
            )));
        }

        let body: AccessTokenResponse = response.json("access token response")?;
        if has_error(&body.error) || body.token.is_empty() {
            return Err(Error::authentication("access token response carried no token"));
        }

        debug!("Minted access token");
        Ok(AccessToken::new(body.token))
    }
}
