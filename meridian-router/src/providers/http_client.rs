//! Shared HTTP plumbing every adapter uses: auth-header strategies plus
//! small JSON request helpers. The one piece of adapter machinery that is
//! genuinely vendor-agnostic.

use crate::error::ProviderError;
use reqwest::{header::HeaderMap, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
    None,
}

#[derive(Clone, Debug)]
pub struct HttpProviderClient {
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpProviderClient {
    pub fn new(
        timeout: Duration,
        base_url: Option<String>,
        default_base: &str,
        headers: &HashMap<String, String>,
        auth: AuthStrategy,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let mut default_headers = HeaderMap::new();

        match auth {
            AuthStrategy::Bearer { token } => {
                if let Ok(value) = format!("Bearer {token}").parse() {
                    default_headers.insert("Authorization", value);
                }
            }
            AuthStrategy::Header { name, value } => {
                if let (Ok(name), Ok(value)) =
                    (name.parse::<reqwest::header::HeaderName>(), value.parse())
                {
                    default_headers.insert(name, value);
                }
            }
            AuthStrategy::None => {}
        }

        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (k.parse::<reqwest::header::HeaderName>(), v.parse()) {
                default_headers.insert(name, value);
            }
        }

        let base_url = base_url.unwrap_or_else(|| default_base.to_string());

        Ok(Self {
            http,
            base_url,
            default_headers,
        })
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    fn build_headers(&self) -> HeaderMap {
        self.default_headers.clone()
    }

    pub async fn post_json<TReq: Serialize + ?Sized, TResp: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TResp, ProviderError> {
        let resp = self.post_json_raw(path, body).await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await.map_err(map_transport_error)?)
    }

    pub async fn post_json_raw<TReq: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<Response, ProviderError> {
        let url = self.build_url(path);
        self.http
            .request(Method::POST, url)
            .headers(self.build_headers())
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)
    }

    pub async fn get_json<TResp: DeserializeOwned>(&self, path: &str) -> Result<TResp, ProviderError> {
        let url = self.build_url(path);
        let resp = self
            .http
            .request(Method::GET, url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(map_transport_error)?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        resp.json::<TResp>().await.map_err(map_transport_error)
    }
}

/// `reqwest::Error` doesn't distinguish a timeout in its `Display`, so
/// classify it explicitly rather than losing the distinction behind the
/// generic `Http` variant — Health Monitor and Dispatcher both care whether
/// a failure was a timeout.
fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Http(std::sync::Arc::new(err))
    }
}

pub async fn map_error_response(resp: Response) -> ProviderError {
    let status = resp.status();
    match resp.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").cloned())
                .and_then(|e| e.get("message").cloned())
                .and_then(|m| m.as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| body.clone());

            match status.as_u16() {
                401 | 403 => ProviderError::AuthenticationFailed,
                404 => ProviderError::ModelNotFound {
                    model_id: "unknown".to_string(),
                },
                429 => ProviderError::RateLimit,
                code if (500..600).contains(&code) => ProviderError::UpstreamServerError,
                code => ProviderError::Api { code, message },
            }
        }
        Err(_) => ProviderError::Api {
            code: status.as_u16(),
            message: "failed to read error response body".to_string(),
        },
    }
}
