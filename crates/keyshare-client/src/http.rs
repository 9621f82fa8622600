//! Thin reqwest wrapper for the key server and QR relay.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ClientError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

#[derive(serde::Deserialize, Debug)]
struct ServerErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|_| ClientError::ServerUnreachable)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ClientError::Server {
                    status: status.as_u16(),
                    message: e.to_string(),
                });
        }

        let code = status.as_u16();
        let body = response.json::<ServerErrorBody>().await.ok();
        let message = body
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| format!("HTTP {code}"));

        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(message)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::NotAuthenticated),
            _ => Err(ClientError::Server {
                status: code,
                message,
            }),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T> {
        let mut req = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T> {
        let mut req = self.client.put(self.url(path)).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    pub async fn delete<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<()> {
        let mut req = self.client.delete(self.url(path)).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();

        if status.is_success() {
            return Ok(());
        }

        let code = status.as_u16();
        let body = resp.json::<ServerErrorBody>().await.ok();
        let message = body
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| format!("HTTP {code}"));

        Err(ClientError::Server {
            status: code,
            message,
        })
    }
}
