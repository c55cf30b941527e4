use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, StatusCode};
use tracing::debug;

use kbq_core::config::RemoteLocator;
use kbq_core::traits::ObjectStore;
use kbq_core::{Error, Result};

use crate::sigv4::{self, Credentials};

/// Path-style S3 client for a single bucket, signed with SigV4.
pub struct S3Client {
    http: Client,
    endpoint: String,
    host: String,
    bucket: String,
    creds: Credentials,
}

impl S3Client {
    pub fn new(locator: &RemoteLocator) -> Result<Self> {
        locator.validate()?;
        let endpoint = locator.endpoint_url()?;
        let host = endpoint
            .split_once("://")
            .map_or(endpoint.as_str(), |(_, rest)| rest)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if host.is_empty() {
            return Err(Error::Config(format!("index.endpoint '{endpoint}' has no host")));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            host,
            bucket: locator.bucket.trim().to_string(),
            creds: Credentials {
                access_key_id: locator.access_key_id.clone(),
                secret_access_key: locator.secret_access_key.clone(),
                region: locator.region.clone(),
            },
        })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    fn request(&self, method: Method, key: Option<&str>) -> Result<RequestBuilder> {
        let path = match key {
            Some(key) => format!("/{}/{}", self.bucket, key.trim_start_matches('/')),
            None => format!("/{}", self.bucket),
        };
        let uri = sigv4::uri_encode_path(&path);
        let signed = sigv4::sign(&self.creds, method.as_str(), &self.host, &uri, Utc::now())?;
        Ok(self
            .http
            .request(method, format!("{}{uri}", self.endpoint))
            .header("authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256))
    }

    fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        builder.send().map_err(|e| Error::Connection(format!("object store unreachable ({what}): {e}")))
    }
}

impl ObjectStore for S3Client {
    fn bucket_exists(&self) -> Result<bool> {
        let response = self.send(self.request(Method::HEAD, None)?, "head bucket")?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Connection(format!("access to bucket '{}' denied ({})", self.bucket, response.status())))
            }
            s => Err(Error::Connection(format!("head bucket '{}' returned {s}", self.bucket))),
        }
    }

    fn object_size(&self, key: &str) -> Result<Option<u64>> {
        let response = self.send(self.request(Method::HEAD, Some(key))?, key)?;
        match response.status() {
            // HEAD has no body, so read the header rather than the body length.
            s if s.is_success() => Ok(Some(
                response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            )),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(Error::Connection(format!("head object '{key}' returned {s}"))),
        }
    }

    fn fetch(&self, key: &str, dest: &Path) -> Result<u64> {
        let mut response = self.send(self.request(Method::GET, Some(key))?, key)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::IndexLoad(format!("object '{key}' not found")));
        }
        if !status.is_success() {
            return Err(Error::Connection(format!("get object '{key}' returned {status}")));
        }
        let file = File::create(dest).map_err(|e| Error::IndexLoad(format!("cannot create {}: {e}", dest.display())))?;
        let mut writer = BufWriter::new(file);
        let bytes = response
            .copy_to(&mut writer)
            .map_err(|e| Error::Connection(format!("download of '{key}' interrupted: {e}")))?;
        writer.flush().map_err(|e| Error::IndexLoad(format!("cannot write {}: {e}", dest.display())))?;
        debug!(key, bytes, "object downloaded");
        Ok(bytes)
    }
}
