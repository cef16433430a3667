use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer. `code` is the service's application code when the
    /// body carried one.
    #[error("service returned {status}: {message}")]
    Status {
        status: StatusCode,
        code: Option<u32>,
        message: String,
    },
}

impl SdkError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SdkError::Status { status, .. } => Some(*status),
            SdkError::Http(e) => e.status(),
        }
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            SdkError::Status { code, .. } => *code,
            SdkError::Http(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: u64,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordResponse {
    pub message: String,
    pub version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

pub struct AccountClient {
    client: Client,
    base_url: String,
}

impl AccountClient {
    pub fn new(base_url: &str) -> Result<Self, SdkError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("account-sdk"));
        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health(&self) -> Result<HealthResponse, SdkError> {
        let resp = self.client.get(format!("{}/health", self.base_url)).send().await?;
        decode(resp).await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<RegisterResponse, SdkError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/users/register", self.base_url))
            .json(&json!({ "username": username, "email": email, "password": password }))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, SdkError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/users/login", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn change_password(
        &self,
        token: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<ChangePasswordResponse, SdkError> {
        let resp = self
            .client
            .put(format!("{}/api/v1/users/password", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&json!({ "old_password": old_password, "new_password": new_password }))
            .send()
            .await?;
        decode(resp).await
    }

    /// Raw GET for callers that need headers or query strings the typed
    /// methods do not cover.
    pub async fn get(&self, path_and_query: &str) -> Result<Response, reqwest::Error> {
        self.client
            .get(format!("{}{}", self.base_url, path_and_query))
            .send()
            .await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, SdkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let text = resp.text().await?;
    Err(match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => SdkError::Status {
            status,
            code: Some(body.code),
            message: body.message,
        },
        Err(_) => SdkError::Status {
            status,
            code: None,
            message: text,
        },
    })
}
