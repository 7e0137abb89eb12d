//! HTTP helpers for tests talking to the running server.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Realm the example realm export defines.
pub const TEST_REALM: &str = "test-realm";

/// Client id used for direct grant token requests.
pub const ADMIN_CLI: &str = "admin-cli";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode form: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Expected exactly one user for '{email}', found {count}")]
    UnexpectedUserCount { email: String, count: usize },
}

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

impl Response {
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Subset of the admin API user representation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepresentation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Thin wrapper over `reqwest` bound to one server and realm.
#[derive(Debug, Clone)]
pub struct KeycloakClient {
    http: reqwest::Client,
    auth_url: String,
    realm: String,
}

impl KeycloakClient {
    /// `auth_url` is the server base, e.g. `http://localhost:8080/auth`.
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            realm: TEST_REALM.to_string(),
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.auth_url, self.realm
        )
    }

    /// Admin API lookup of users by exact e-mail.
    pub fn users_by_email_url(&self, email: &str) -> Result<String, ClientError> {
        let query = serde_urlencoded::to_string([("email", email), ("exact", "true")])?;
        Ok(format!(
            "{}/admin/realms/{}/users?{query}",
            self.auth_url, self.realm
        ))
    }

    /// Password grant for `username` through `admin-cli`; returns the access token.
    pub async fn token(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let form = token_form(username, password)?;
        let url = self.token_url();

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;
        let response = checked(Method::POST, url, response).await?;

        let token: TokenResponse = response.json()?;
        Ok(token.access_token)
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Response, ClientError> {
        self.send(Method::GET, url, None, token).await
    }

    pub async fn post(&self, url: &str, body: &str, token: &str) -> Result<Response, ClientError> {
        self.send(Method::POST, url, Some(body), token).await
    }

    pub async fn delete(&self, url: &str, body: &str, token: &str) -> Result<Response, ClientError> {
        self.send(Method::DELETE, url, Some(body), token).await
    }

    /// Look up the single user with `email`.
    pub async fn user_by_email(
        &self,
        email: &str,
        token: &str,
    ) -> Result<UserRepresentation, ClientError> {
        let url = self.users_by_email_url(email)?;
        let response = self.get(&url, token).await?;
        let response = ensure_success(Method::GET, url, response)?;

        single_user(email, response.json()?)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        token: &str,
    ) -> Result<Response, ClientError> {
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        Ok(Response {
            status: response.status(),
            body: response.text().await?,
        })
    }
}

/// Form body for a password grant.
pub fn token_form(username: &str, password: &str) -> Result<String, ClientError> {
    Ok(serde_urlencoded::to_string([
        ("grant_type", "password"),
        ("client_id", ADMIN_CLI),
        ("username", username),
        ("password", password),
    ])?)
}

/// Exactly one user, or `UnexpectedUserCount`.
pub fn single_user(
    email: &str,
    mut users: Vec<UserRepresentation>,
) -> Result<UserRepresentation, ClientError> {
    if users.len() != 1 {
        return Err(ClientError::UnexpectedUserCount {
            email: email.to_string(),
            count: users.len(),
        });
    }
    Ok(users.remove(0))
}

async fn checked(
    method: Method,
    url: String,
    response: reqwest::Response,
) -> Result<Response, ClientError> {
    let response = Response {
        status: response.status(),
        body: response.text().await?,
    };
    ensure_success(method, url, response)
}

fn ensure_success(method: Method, url: String, response: Response) -> Result<Response, ClientError> {
    if response.status.is_success() {
        return Ok(response);
    }
    Err(ClientError::Status {
        method,
        url,
        status: response.status,
        body: response.body,
    })
}
