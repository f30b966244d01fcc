//! Cloud account backend.
//!
//! The backend exposes one REST resource per collection:
//! `GET /api/<table>[?since=<rfc3339>]`, `PUT /api/<table>` (upsert a batch)
//! and `DELETE /api/<table>/<id>`. Responses are wrapped as
//! `{ "success": true, "data": ... }`; failures carry `{ "error": "..." }`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{UrusError, UrusResult};
use crate::model::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// A signed-in account as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub user: User,
    pub token: String,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, table: Table, since: Option<DateTime<Utc>>) -> UrusResult<Vec<Value>>;
    async fn upsert(&self, table: Table, records: &[Value]) -> UrusResult<()>;
    async fn delete(&self, table: Table, id: &str) -> UrusResult<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: &str) -> Self {
        HttpRemote {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Exchange email and password for an account token.
    pub async fn login(base_url: &str, email: &str, password: &str) -> UrusResult<Credentials> {
        let url = format!("{}/api/auth/login", base_url.trim_end_matches('/'));
        let response = reqwest::Client::new()
            .post(url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| UrusError::Cloud(e.to_string()))?;

        parse_response::<Credentials>(response)
            .await?
            .ok_or_else(|| UrusError::Cloud("Login response carried no account".into()))
    }

    fn url(&self, table: Table) -> String {
        format!("{}/api/{}", self.base_url, table.endpoint())
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch(&self, table: Table, since: Option<DateTime<Utc>>) -> UrusResult<Vec<Value>> {
        let mut request = self.client.get(self.url(table)).bearer_auth(&self.token);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UrusError::Cloud(e.to_string()))?;

        Ok(parse_response::<Vec<Value>>(response).await?.unwrap_or_default())
    }

    async fn upsert(&self, table: Table, records: &[Value]) -> UrusResult<()> {
        let response = self
            .client
            .put(self.url(table))
            .bearer_auth(&self.token)
            .json(records)
            .send()
            .await
            .map_err(|e| UrusError::Cloud(e.to_string()))?;

        parse_response::<Value>(response).await.map(|_| ())
    }

    async fn delete(&self, table: Table, id: &str) -> UrusResult<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.url(table), id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| UrusError::Cloud(e.to_string()))?;

        parse_response::<Value>(response).await.map(|_| ())
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> UrusResult<Option<T>> {
    let status = response.status();
    let body: ApiResponse<T> = response
        .json()
        .await
        .map_err(|e| UrusError::Cloud(format!("Failed to parse response: {e}")))?;

    if !status.is_success() {
        return Err(UrusError::Cloud(
            body.error
                .unwrap_or_else(|| format!("API error: {}", status.as_u16())),
        ));
    }

    Ok(body.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_envelope_carries_credentials() {
        let body = r#"{"success":true,"data":{"user":{"id":"u1","email":"a@b.c"},"token":"t0k"}}"#;
        let parsed: ApiResponse<Credentials> = serde_json::from_str(body).unwrap();
        let credentials = parsed.data.unwrap();
        assert_eq!(credentials.user.label(), "a@b.c");
        assert_eq!(credentials.token, "t0k");
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let parsed: ApiResponse<Credentials> = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.error.as_deref(), Some("x"));

        let listed: ApiResponse<Vec<Value>> =
            serde_json::from_str(r#"{"success":true,"data":[{"id":"p1"}]}"#).unwrap();
        assert_eq!(listed.data.map(|d| d.len()), Some(1));
    }
}
