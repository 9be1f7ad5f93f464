//! Docker Registry v2 API session.
//!
//! One session per configured registry endpoint. Handles the bearer-token
//! challenge flow with optional basic-auth credentials and per-request
//! extra headers; supports insecure (plain HTTP / untrusted TLS) endpoints.

use std::collections::HashMap;

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::error::{RegistryError, Result};
use crate::TagLister;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Basic-auth credentials for a registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

/// Token response from the registry auth service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Tag listing response from `/v2/<name>/tags/list`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[allow(dead_code)]
    name: Option<String>,
    tags: Option<Vec<String>>,
}

/// WWW-Authenticate challenge parsed from a 401 response.
#[derive(Debug, Default)]
struct AuthChallenge {
    realm: String,
    service: String,
    scope: String,
}

/// An open session against one registry endpoint.
pub struct RegistrySession {
    client: Client,
    base_url: Url,
    auth: Option<RegistryAuth>,
    /// Cached bearer tokens, keyed by repository.
    tokens: RwLock<HashMap<String, String>>,
}

impl RegistrySession {
    /// Opens a session for the given endpoint.
    ///
    /// `endpoint` may omit the scheme; it defaults to `https://`, or
    /// `http://` when `insecure` is set. Insecure sessions also accept
    /// untrusted TLS certificates. `headers` are sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the HTTP client
    /// cannot be built.
    pub fn open(
        endpoint: &str,
        insecure: bool,
        auth: Option<RegistryAuth>,
        headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let base_url = normalize_endpoint(endpoint, insecure)?;

        let mut default_headers = header::HeaderMap::new();
        for (name, value) in headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RegistryError::Registry(format!("invalid header name {name}: {e}")))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| RegistryError::Registry(format!("invalid header value: {e}")))?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent("deviced/0.2")
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(std::time::Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .default_headers(default_headers)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self {
            client,
            base_url,
            auth,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    /// The endpoint this session talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.base_url
    }

    /// Lists all tags of a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is unreachable, authentication
    /// fails, or the response cannot be parsed.
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = format!("{}v2/{repository}/tags/list", self.base_url);
        debug!(url = %url, "listing tags");

        let response = self.request_with_auth(&url, repository).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::Registry(format!(
                "repository {repository} not found"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Registry(format!(
                "tag listing failed: {status} - {body}"
            )));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.tags.unwrap_or_default())
    }

    /// Makes an authenticated GET, handling the 401 token challenge.
    async fn request_with_auth(&self, url: &str, repository: &str) -> Result<reqwest::Response> {
        let cached_token = {
            let tokens = self.tokens.read().await;
            tokens.get(repository).cloned()
        };

        if let Some(token) = cached_token {
            let response = self
                .client
                .get(url)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .send()
                .await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            // Token expired; clear it and fall through to the challenge.
            let mut tokens = self.tokens.write().await;
            tokens.remove(repository);
        }

        let mut request = self.client.get(url);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = parse_www_authenticate(&response)?;
            let token = self.get_token(&challenge).await?;
            {
                let mut tokens = self.tokens.write().await;
                tokens.insert(repository.to_string(), token.clone());
            }
            let response = self
                .client
                .get(url)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .send()
                .await?;
            return Ok(response);
        }

        Ok(response)
    }

    /// Fetches a bearer token from the challenge's auth service.
    async fn get_token(&self, challenge: &AuthChallenge) -> Result<String> {
        let url = format!(
            "{}?service={}&scope={}",
            challenge.realm, challenge.service, challenge.scope
        );
        debug!(url = %url, "requesting token");

        let mut request = self.client.get(&url);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Auth(format!("token request failed: {e}")))?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Auth(format!("token request failed: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Auth(format!("bad token response: {e}")))?;
        Ok(token.token)
    }
}

#[async_trait::async_trait]
impl TagLister for RegistrySession {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        Self::list_tags(self, repository).await
    }
}

/// Normalizes a configured endpoint into a base URL with trailing slash.
fn normalize_endpoint(endpoint: &str, insecure: bool) -> Result<Url> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else if insecure {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    };
    let mut url = Url::parse(&with_scheme)?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

/// Parses the WWW-Authenticate header of a 401 response.
fn parse_www_authenticate(response: &reqwest::Response) -> Result<AuthChallenge> {
    let header = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| RegistryError::Auth("missing WWW-Authenticate header".to_string()))?;

    trace!(header = %header, "parsing WWW-Authenticate");

    let mut challenge = AuthChallenge::default();
    for part in header.trim_start_matches("Bearer ").split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("realm=") {
            challenge.realm = value.trim_matches('"').to_string();
        } else if let Some(value) = part.strip_prefix("service=") {
            challenge.service = value.trim_matches('"').to_string();
        } else if let Some(value) = part.strip_prefix("scope=") {
            challenge.scope = value.trim_matches('"').to_string();
        }
    }

    if challenge.realm.is_empty() {
        return Err(RegistryError::Auth(
            "invalid WWW-Authenticate header".to_string(),
        ));
    }
    Ok(challenge)
}
