//! S3-compatible backend (AWS S3, Cloudflare R2) over path-style HTTP.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode, Url};
use scoutq_core::S3Settings;

use crate::listing::parse_list_objects;
use crate::retry::RetryPolicy;
use crate::sigv4::{self, CanonicalRequest, Credentials};
use crate::{ListPage, ObjectMeta, ObjectStore, PutOptions, PutOutcome, PutPrecondition, StoreError, StoredObject};

const META_PREFIX: &str = "x-amz-meta-";

/// Client for one bucket of an S3-compatible store.
///
/// Every request is signed with SigV4 and retried on transient failures.
/// Conditional writes map to `If-None-Match: *` and `If-Match: <etag>`.
pub struct S3Store {
    client: Client,
    endpoint: Url,
    settings: S3Settings,
    retry: RetryPolicy,
}

struct S3Request<'a> {
    operation: &'static str,
    method: Method,
    key: Option<&'a str>,
    query: Vec<(&'a str, &'a str)>,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl S3Store {
    /// # Errors
    ///
    /// Returns [`StoreError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`StoreError::InvalidConfig`] if the endpoint is not
    /// a valid URL.
    pub fn new(settings: S3Settings, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("scoutq/0.1")
            .build()?;

        let endpoint = Url::parse(settings.endpoint.trim_end_matches('/')).map_err(|e| {
            StoreError::InvalidConfig(format!("invalid endpoint '{}': {e}", settings.endpoint))
        })?;
        if endpoint.host_str().is_none() {
            return Err(StoreError::InvalidConfig(format!(
                "endpoint '{}' has no host",
                settings.endpoint
            )));
        }

        Ok(Self {
            client,
            endpoint,
            settings,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.retry = RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(backoff_base_ms),
        };
        self
    }

    fn object_path(&self, key: Option<&str>) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        let bucket = sigv4::encode_path(&self.settings.bucket);
        match key {
            Some(key) => format!("{base}/{bucket}/{}", sigv4::encode_path(key)),
            None => format!("{base}/{bucket}"),
        }
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    async fn send_once(&self, request: &S3Request<'_>) -> Result<Response, StoreError> {
        let path = self.object_path(request.key);
        let query = sigv4::canonical_query(&request.query);
        let mut url = self.endpoint.clone();
        url.set_path(&path);
        url.set_query((!query.is_empty()).then_some(query.as_str()));

        let now = Utc::now();
        let payload_sha256 = sigv4::sha256_hex(&request.body);
        let mut headers = request.headers.clone();
        headers.insert("host".to_string(), self.host_header());
        headers.insert("x-amz-date".to_string(), sigv4::amz_date(now));
        headers.insert("x-amz-content-sha256".to_string(), payload_sha256.clone());

        let authorization = sigv4::authorization(
            &Credentials {
                access_key_id: &self.settings.access_key_id,
                secret_access_key: &self.settings.secret_access_key,
                region: &self.settings.region,
            },
            &CanonicalRequest {
                method: request.method.as_str(),
                path: url.path(),
                query: &query,
                headers: &headers,
                payload_sha256: &payload_sha256,
            },
            now,
        )?;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header("authorization", authorization);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(request.body.clone()).send().await?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                operation: request.operation,
                key: request.key.unwrap_or_default().to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn execute(&self, request: &S3Request<'_>) -> Result<Response, StoreError> {
        self.execute_counted(request).await.map(|(response, _)| response)
    }

    /// [`Self::execute`], also reporting how many times the request was sent.
    async fn execute_counted(&self, request: &S3Request<'_>) -> Result<(Response, u32), StoreError> {
        let sends = AtomicU32::new(0);
        let response = self
            .retry
            .run(request.operation, || {
                sends.fetch_add(1, Ordering::Relaxed);
                self.send_once(request)
            })
            .await?;
        Ok((response, sends.into_inner()))
    }

    /// After a rejected conditional put that was sent more than once, an
    /// earlier send may have landed before its answer was lost. The write
    /// is ours when the stored bytes are exactly the bytes we sent.
    async fn landed_earlier(&self, key: &str, data: &Bytes) -> Result<Option<String>, StoreError> {
        Ok(self
            .get(key)
            .await?
            .filter(|stored| stored.data == *data)
            .map(|stored| stored.meta.version))
    }

    fn request<'a>(operation: &'static str, method: Method, key: &'a str) -> S3Request<'a> {
        S3Request {
            operation,
            method,
            key: Some(key),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }
}

async fn unexpected_status(operation: &'static str, key: &str, response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Status {
        operation,
        key: key.to_string(),
        status,
        body,
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn meta_from_headers(key: &str, headers: &HeaderMap, body_len: Option<u64>) -> ObjectMeta {
    let size = header_str(headers, "content-length")
        .and_then(|v| v.parse().ok())
        .or(body_len)
        .unwrap_or(0);
    let last_modified = header_str(headers, "last-modified")
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|ts| ts.with_timezone(&Utc));
    let metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            let field = name.as_str().strip_prefix(META_PREFIX)?;
            Some((field.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    ObjectMeta {
        key: key.to_string(),
        size,
        version: header_str(headers, "etag").unwrap_or_default().to_string(),
        last_modified,
        metadata,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let response = self
            .execute(&Self::request("GET", Method::GET, key))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let headers = response.headers().clone();
                let data = response.bytes().await?;
                let meta = meta_from_headers(key, &headers, Some(data.len() as u64));
                Ok(Some(StoredObject { data, meta }))
            }
            _ => Err(unexpected_status("GET", key, response).await),
        }
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let response = self
            .execute(&Self::request("HEAD", Method::HEAD, key))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(meta_from_headers(key, response.headers(), None))),
            _ => Err(unexpected_status("HEAD", key, response).await),
        }
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<PutOutcome, StoreError> {
        let mut request = Self::request("PUT", Method::PUT, key);
        request.body = data;
        match &options.precondition {
            PutPrecondition::None => {}
            PutPrecondition::DoesNotExist => {
                request
                    .headers
                    .insert("if-none-match".to_string(), "*".to_string());
            }
            PutPrecondition::MatchesVersion(etag) => {
                request
                    .headers
                    .insert("if-match".to_string(), etag.clone());
            }
        }
        if let Some(content_type) = &options.content_type {
            request
                .headers
                .insert("content-type".to_string(), content_type.clone());
        }
        for (name, value) in &options.metadata {
            request.headers.insert(
                format!("{META_PREFIX}{}", name.to_ascii_lowercase()),
                value.clone(),
            );
        }

        let (response, sends) = self.execute_counted(&request).await?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                if sends > 1 {
                    if let Some(version) = self.landed_earlier(key, &request.body).await? {
                        tracing::info!(key, sends, "store: retried conditional put had already landed");
                        return Ok(PutOutcome::Written { version });
                    }
                }
                tracing::debug!(key, "store: conditional put rejected");
                Ok(PutOutcome::PreconditionFailed)
            }
            s if s.is_success() => Ok(PutOutcome::Written {
                version: header_str(response.headers(), "etag")
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => Err(unexpected_status("PUT", key, response).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let response = self
            .execute(&Self::request("DELETE", Method::DELETE, key))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            _ => Err(unexpected_status("DELETE", key, response).await),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut query = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(token) = continuation {
            query.push(("continuation-token", token));
        }
        let request = S3Request {
            operation: "LIST",
            method: Method::GET,
            key: None,
            query,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        };

        let response = self.execute(&request).await?;
        if !response.status().is_success() {
            return Err(unexpected_status("LIST", prefix, response).await);
        }
        let body = response.text().await?;
        parse_list_objects(&body)
    }
}
