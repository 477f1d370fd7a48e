#![warn(missing_docs)]
//! # healthpix-session
//!
//! ## Purpose
//! Holds the current auth session and gates access to history and upload.
//!
//! ## Responsibilities
//! - Execute register/login requests through an injectable transport.
//! - Store the opaque bearer token and username on login success.
//! - Refuse authorization once logged out, so stale calls fail fast.
//!
//! ## Data flow
//! Shell collects credentials -> [`SessionGate::login`] sends them through
//! [`AuthTransport`] -> [`Session`] is stored -> downstream layers call
//! [`SessionGate::authorize`] for the bearer token -> logout clears it and
//! the app layer cascades teardown to history and capture.
//!
//! ## Ownership and lifetimes
//! Token and username are owned strings; the gate hands out borrowed token
//! slices only for the duration of one authorized call.
//!
//! ## Error model
//! Collaborator rejections carry the server message verbatim as
//! [`SessionError::AuthRejected`]; unauthorized access is
//! [`SessionError::NotAuthenticated`].
//!
//! ## Security and privacy notes
//! Tokens are opaque: the gate never parses, validates, or logs them.
//! Credentials are read once and not retained.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// User-provided login/register credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Request body for both auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Username for account lookup or creation.
    pub username: String,
    /// Password for verification or storage.
    pub password: String,
}

/// Response body of the register endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Human-readable confirmation message.
    pub message: String,
}

/// Response body of the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Opaque bearer token for protected calls.
    pub token: String,
    /// Username echoed by the auth service.
    pub username: String,
}

/// The authenticated session owned by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token; never interpreted client-side.
    pub token: String,
    /// Logged-in username.
    pub username: String,
}

/// Abstract transport used by the session gate.
pub trait AuthTransport: Send + Sync {
    /// Sends a register request.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthRejected`] with the collaborator's message
    /// for refused registrations, [`SessionError::Transport`] otherwise.
    fn register(
        &self,
        endpoint: &str,
        request: &AuthRequest,
    ) -> Result<RegisterResponse, SessionError>;

    /// Sends a login request.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthRejected`] for refused credentials. A
    /// failed login is a failed login; the service must never provision an
    /// account as a side effect.
    fn login(&self, endpoint: &str, request: &AuthRequest) -> Result<LoginResponse, SessionError>;
}

/// Session gate validating the auth base URL and owning the session.
#[derive(Clone)]
pub struct SessionGate {
    register_endpoint: String,
    login_endpoint: String,
    transport: Arc<dyn AuthTransport>,
    session: Option<Session>,
}

impl SessionGate {
    /// Creates a gate for the given auth base URL.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidEndpoint`] when the base URL does not
    /// parse or does not use HTTPS.
    pub fn new(
        auth_base: impl AsRef<str>,
        transport: Arc<dyn AuthTransport>,
    ) -> Result<Self, SessionError> {
        let base = Url::parse(auth_base.as_ref())
            .map_err(|error| SessionError::InvalidEndpoint(format!("invalid auth url: {error}")))?;
        if base.scheme() != "https" {
            return Err(SessionError::InvalidEndpoint(
                "auth endpoint must use https".to_string(),
            ));
        }

        let join = |path: &str| {
            base.join(path)
                .map(|url| url.to_string())
                .map_err(|error| SessionError::InvalidEndpoint(error.to_string()))
        };

        Ok(Self {
            register_endpoint: join("auth/register")?,
            login_endpoint: join("auth/login")?,
            transport,
            session: None,
        })
    }

    /// Registers a new account and returns the service message.
    ///
    /// Registration does not create a session; the user logs in afterwards.
    ///
    /// # Errors
    /// Returns [`SessionError::EmptyCredential`] for blank inputs and
    /// propagates transport/rejection errors.
    pub fn register(&self, credentials: &Credentials) -> Result<String, SessionError> {
        ensure_non_blank(credentials)?;
        let response = self.transport.register(
            &self.register_endpoint,
            &AuthRequest {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            },
        )?;
        Ok(response.message)
    }

    /// Logs in and stores the returned session.
    ///
    /// # Errors
    /// Returns [`SessionError::EmptyCredential`] for blank inputs,
    /// [`SessionError::AuthRejected`] verbatim from the collaborator, and
    /// [`SessionError::InvalidResponse`] when the response lacks a token.
    pub fn login(&mut self, credentials: &Credentials) -> Result<&Session, SessionError> {
        ensure_non_blank(credentials)?;
        let response = self.transport.login(
            &self.login_endpoint,
            &AuthRequest {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            },
        )?;

        if response.token.trim().is_empty() {
            return Err(SessionError::InvalidResponse(
                "login response is missing a token".to_string(),
            ));
        }

        Ok(self.session.insert(Session {
            token: response.token,
            username: response.username,
        }))
    }

    /// Clears the session and returns it for teardown bookkeeping.
    ///
    /// Logging out while logged out is a no-op returning `None`.
    pub fn logout(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Returns the bearer token when a session exists.
    ///
    /// Token presence is the sole authorization gate in this design; the
    /// token itself is never inspected.
    ///
    /// # Errors
    /// Returns [`SessionError::NotAuthenticated`] without a session.
    pub fn authorize(&self) -> Result<&str, SessionError> {
        self.session
            .as_ref()
            .map(|session| session.token.as_str())
            .ok_or(SessionError::NotAuthenticated)
    }

    /// Returns `true` while a session is held.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the logged-in username, if any.
    pub fn current_user(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.username.as_str())
    }
}

fn ensure_non_blank(credentials: &Credentials) -> Result<(), SessionError> {
    if credentials.username.trim().is_empty() || credentials.password.trim().is_empty() {
        return Err(SessionError::EmptyCredential);
    }
    Ok(())
}

/// Session layer error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Auth base URL violates transport requirements.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Username or password is blank.
    #[error("username and password must be non-empty")]
    EmptyCredential,
    /// Auth collaborator refused the request; message is verbatim.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    /// Transport failure before any auth decision.
    #[error("auth transport failure: {0}")]
    Transport(String),
    /// Response payload violated the auth contract.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
    /// No session is held; history and upload calls must be refused.
    #[error("not authenticated")]
    NotAuthenticated,
}

#[cfg(test)]
mod tests {
    //! Unit tests for gate authorization and login transitions.

    use super::*;

    struct StaticTransport;

    impl AuthTransport for StaticTransport {
        fn register(
            &self,
            _endpoint: &str,
            request: &AuthRequest,
        ) -> Result<RegisterResponse, SessionError> {
            if request.username == "taken" {
                return Err(SessionError::AuthRejected("user already exists".to_string()));
            }
            Ok(RegisterResponse {
                message: "user created".to_string(),
            })
        }

        fn login(
            &self,
            _endpoint: &str,
            request: &AuthRequest,
        ) -> Result<LoginResponse, SessionError> {
            if request.password != "pw" {
                return Err(SessionError::AuthRejected("wrong password".to_string()));
            }
            Ok(LoginResponse {
                token: format!("token-{}", request.username),
                username: request.username.clone(),
            })
        }
    }

    fn gate() -> SessionGate {
        SessionGate::new("https://api.healthpix.test/", Arc::new(StaticTransport))
            .expect("gate should build")
    }

    #[test]
    fn requires_https_base_url() {
        assert!(matches!(
            SessionGate::new("http://api.healthpix.test/", Arc::new(StaticTransport)),
            Err(SessionError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn login_stores_session_and_unblocks_authorize() {
        let mut gate = gate();
        assert!(matches!(gate.authorize(), Err(SessionError::NotAuthenticated)));

        gate.login(&Credentials {
            username: "alice".to_string(),
            password: "pw".to_string(),
        })
        .expect("login should succeed");

        assert_eq!(gate.authorize().expect("token should exist"), "token-alice");
        assert_eq!(gate.current_user(), Some("alice"));
    }

    #[test]
    fn rejected_login_surfaces_collaborator_message() {
        let mut gate = gate();
        let error = gate
            .login(&Credentials {
                username: "alice".to_string(),
                password: "wrong".to_string(),
            })
            .expect_err("login should fail");
        assert!(matches!(
            error,
            SessionError::AuthRejected(ref message) if message == "wrong password"
        ));
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn blank_credentials_fail_locally() {
        let mut gate = gate();
        assert!(matches!(
            gate.login(&Credentials {
                username: "  ".to_string(),
                password: "pw".to_string(),
            }),
            Err(SessionError::EmptyCredential)
        ));
    }

    #[test]
    fn logout_clears_session_and_is_idempotent() {
        let mut gate = gate();
        gate.login(&Credentials {
            username: "alice".to_string(),
            password: "pw".to_string(),
        })
        .expect("login should succeed");

        assert!(gate.logout().is_some());
        assert!(gate.logout().is_none());
        assert!(matches!(gate.authorize(), Err(SessionError::NotAuthenticated)));
    }
}
