//! HTTP client with request, response and error interceptor chains.
//!
//! Dispatch order: request interceptors (installation order), reqwest,
//! response interceptors. A failure at any step runs the error chain, where
//! an interceptor may recover with a substitute response.

mod config;
mod error;
mod interceptor;
mod request;

pub use config::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpClientConfig};
pub use error::ClientError;
pub use interceptor::{
    ErrorInterceptor, ErrorOutcome, InterceptorHandle, InterceptorId, InterceptorKind,
    InterceptorManager, Interceptors, RequestInterceptor, ResponseInterceptor,
};
pub use request::{HttpRequest, HttpResponse};

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

struct Inner {
    http: reqwest::Client,
    config: HttpClientConfig,
    interceptors: Interceptors,
}

/// Cheap to clone; clones share interceptors and the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.inner.config)
            .field("interceptors", &self.inner.interceptors)
            .finish()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::with_http(reqwest::Client::new(), HttpClientConfig::default())
    }
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_http(http, config))
    }

    /// Wraps an existing reqwest client. Timeout and default headers from
    /// `config` are still applied per request.
    pub fn with_http(http: reqwest::Client, config: HttpClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                interceptors: Interceptors::new(),
            }),
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.inner.config
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.inner.interceptors
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, ClientError> {
        self.send(HttpRequest::get(url)).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<HttpResponse, ClientError> {
        self.send(HttpRequest::post(url).json(body)).await
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let original = request.clone();
        let mut request = request;

        for interceptor in self.inner.interceptors.request.snapshot() {
            let before = request.clone();
            match interceptor.intercept(request).await {
                Ok(next) => request = next,
                Err(e) => return self.handle_error(&before, e).await,
            }
        }

        let mut response = match self.dispatch(&request).await {
            Ok(response) => response,
            Err(e) => return self.handle_error(&request, e).await,
        };

        for interceptor in self.inner.interceptors.response.snapshot() {
            match interceptor.intercept(response).await {
                Ok(next) => response = next,
                Err(e) => return self.handle_error(&request, e).await,
            }
        }

        tracing::trace!(
            method = %original.method,
            url = %original.url,
            status = response.status,
            "request completed"
        );
        Ok(response)
    }

    async fn handle_error(
        &self,
        request: &HttpRequest,
        error: ClientError,
    ) -> Result<HttpResponse, ClientError> {
        let mut error = error;
        for interceptor in self.inner.interceptors.error.snapshot() {
            match interceptor.intercept(request, error).await {
                ErrorOutcome::Recover(response) => {
                    tracing::debug!(
                        interceptor = interceptor.name(),
                        status = response.status,
                        "error recovered by interceptor"
                    );
                    return Ok(response);
                }
                ErrorOutcome::Propagate(next) => error = next,
            }
        }
        Err(error)
    }

    fn resolve_url(&self, url: &str) -> Result<Url, ClientError> {
        let invalid = |e: url::ParseError| ClientError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        };

        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = &self.inner.config.base_url else {
                    return Err(ClientError::InvalidUrl {
                        url: url.to_string(),
                        message: "relative URL without a configured base URL".into(),
                    });
                };
                let base = if base.ends_with('/') {
                    base.clone()
                } else {
                    format!("{}/", base)
                };
                let base = Url::parse(&base).map_err(invalid)?;
                base.join(url.trim_start_matches('/')).map_err(invalid)
            }
            Err(e) => Err(invalid(e)),
        }
    }

    fn header_map(&self, request: &HttpRequest) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let merged = self
            .inner
            .config
            .default_headers
            .iter()
            .chain(request.headers.iter());

        for (name, value) in merged {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    async fn dispatch(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        let mut url = self.resolve_url(&request.url)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        let headers = self.header_map(request)?;

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(request.timeout.unwrap_or(self.inner.config.timeout));

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        let response = HttpResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            extensions: request.extensions.clone(),
        };

        if !response.is_success() {
            return Err(ClientError::Status {
                status,
                message: response.text(),
            });
        }
        Ok(response)
    }
}
