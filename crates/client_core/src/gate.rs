use shared::{domain::SessionToken, protocol::LoginRequest};
use tracing::{info, warn};

use crate::{
    error::{ClientError, ValidationErrors},
    gateway::ApiGateway,
    session::{AuthStatus, SessionStore},
};

pub const LOGIN_ROUTE: &str = "/login";
pub const LANDING_ROUTE: &str = "/dashboard/orders";
const PROTECTED_PREFIX: &str = "/dashboard";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Protected,
}

pub fn classify_route(path: &str) -> RouteAccess {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    match path.strip_prefix(PROTECTED_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => RouteAccess::Protected,
        _ => RouteAccess::Public,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Public,
    Allow(SessionToken),
    Redirect { to: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Rendered(T),
    Redirected { to: &'static str },
}

impl<T> Guarded<T> {
    pub fn rendered(self) -> Option<T> {
        match self {
            Guarded::Rendered(value) => Some(value),
            Guarded::Redirected { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Trims both fields and applies the login form rules.
    pub fn validate(&self) -> Result<LoginRequest, ClientError> {
        let username = self.username.trim();
        let password = self.password.trim();
        let mut errors = ValidationErrors::new();
        if username.is_empty() {
            errors.push("username", "username is required");
        }
        if password.is_empty() {
            errors.push("password", "password is required");
        } else if password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(
                "password",
                format!("password must have at least {MIN_PASSWORD_LEN} characters"),
            );
        }
        errors.into_result()?;
        Ok(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

pub struct AuthGate {
    session: SessionStore,
}

impl AuthGate {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn status(&self) -> AuthStatus {
        self.session.status()
    }

    pub fn evaluate(&self, path: &str) -> GateDecision {
        match classify_route(path) {
            RouteAccess::Public => GateDecision::Public,
            RouteAccess::Protected => match self.session.token() {
                Some(token) if self.session.is_authenticated() => {
                    GateDecision::Allow(token.clone())
                }
                _ => {
                    info!(path, "gate: unauthenticated navigation redirected");
                    GateDecision::Redirect { to: LOGIN_ROUTE }
                }
            },
        }
    }

    /// Runs `render` for the protected tree only with a live credential;
    /// otherwise `render` is never called.
    pub fn guard<T>(&self, render: impl FnOnce(SessionToken) -> T) -> Guarded<T> {
        match self.evaluate(PROTECTED_PREFIX) {
            GateDecision::Allow(token) => Guarded::Rendered(render(token)),
            GateDecision::Redirect { to } => Guarded::Redirected { to },
            GateDecision::Public => Guarded::Redirected { to: LOGIN_ROUTE },
        }
    }

    /// Gate check for a concrete navigation target.
    pub fn navigate<T>(
        &self,
        path: &str,
        render: impl FnOnce(Option<SessionToken>) -> T,
    ) -> Guarded<T> {
        match self.evaluate(path) {
            GateDecision::Public => Guarded::Rendered(render(None)),
            GateDecision::Allow(token) => Guarded::Rendered(render(Some(token))),
            GateDecision::Redirect { to } => Guarded::Redirected { to },
        }
    }

    /// Returns the landing route on success.
    pub async fn login(
        &mut self,
        gateway: &ApiGateway,
        credentials: &LoginCredentials,
    ) -> Result<&'static str, ClientError> {
        let request = credentials.validate()?;
        let token = gateway.login(&request).await?;
        self.session.set_session(token).await?;
        Ok(LANDING_ROUTE)
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.session.clear_session().await
    }

    /// Drops the session when `err` is an authorization failure. Returns whether it did.
    pub async fn report_failure(&mut self, err: &ClientError) -> Result<bool, ClientError> {
        if !err.is_authorization_failure() {
            return Ok(false);
        }
        warn!(error = %err, "gate: credential rejected by backend; forcing re-login");
        self.session.clear_session().await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
