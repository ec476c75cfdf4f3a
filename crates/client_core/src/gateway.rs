use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::SessionToken,
    error::ApiError,
    protocol::{Envelope, LoginRequest, LoginResponse, MessageResponse},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

pub const LOGIN_PATH: &str = "login-admin";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    /// Static resources root probed before showing the login entry point.
    pub resources_url: Option<Url>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid backend url '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            resources_url: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

#[derive(Clone)]
pub struct ApiGateway {
    http: Client,
    base_url: Url,
    resources_url: Option<Url>,
}

impl ApiGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ClientError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "backend url '{}' cannot be used as a base",
                config.base_url
            )));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
            resources_url: config.resources_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::Config(format!("backend url '{}' cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Exchanges admin credentials for a bearer token. No session is touched here.
    pub async fn login(&self, request: &LoginRequest) -> Result<SessionToken, ClientError> {
        let url = self.endpoint(&[LOGIN_PATH])?;
        info!(username = %request.username, "gateway: login exchange");
        let response = self.http.post(url).json(request).send().await?;
        let body: LoginResponse = decode_success(response).await?;
        SessionToken::new(body.token_jwt)
            .ok_or_else(|| ClientError::Decode("login response carried an empty token".into()))
    }

    /// Reachability check against the resources root (falls back to the API base).
    pub async fn probe(&self) -> Result<(), ClientError> {
        let url = self
            .resources_url
            .clone()
            .unwrap_or_else(|| self.base_url.clone());
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "gateway: probe");
        if status.is_server_error() {
            return Err(ClientError::Backend {
                status: status.as_u16(),
                message: format!("backend at {url} is unavailable"),
            });
        }
        Ok(())
    }

    pub fn authorized(&self, token: SessionToken) -> AuthorizedGateway {
        AuthorizedGateway {
            gateway: self.clone(),
            token,
        }
    }
}

/// Gateway bound to a session token; every request carries `Authorization: Bearer`.
#[derive(Clone)]
pub struct AuthorizedGateway {
    gateway: ApiGateway,
    token: SessionToken,
}

impl AuthorizedGateway {
    /// `Ok(None)` for 404 or for a success envelope without `data`.
    pub async fn get_data<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<Option<T>, ClientError> {
        let url = self.gateway.endpoint(segments)?;
        let response = self
            .gateway
            .http
            .get(url)
            .bearer_auth(self.token.expose())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: Envelope<T> = decode_success(response).await?;
        Ok(envelope.data)
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<MessageResponse, ClientError> {
        let url = self.gateway.endpoint(segments)?;
        let response = self
            .gateway
            .http
            .post(url)
            .bearer_auth(self.token.expose())
            .json(body)
            .send()
            .await?;
        decode_success(response).await
    }
}

async fn decode_success<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let url = response.url().clone();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let msg = serde_json::from_slice::<MessageResponse>(&bytes)
            .ok()
            .and_then(|body| body.msg);
        let error = ApiError::from_response(status.as_u16(), msg);
        warn!(%url, status = status.as_u16(), code = ?error.code, "gateway: request rejected");
        return Err(ClientError::from_api_error(status.as_u16(), error));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| ClientError::Decode(format!("unexpected body from {url}: {e}")))
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
