//! HTTP(S) transport backed by reqwest.

use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use tokio::io::AsyncWriteExt;

use crate::error::{CacheEntry, CacheError};

use super::{FetchRequest, Payload, Progress, ProgressReporter, Transport};

/// HTTP User-Agent string to use.
const USER_AGENT: &str = concat!("fetchcache/", env!("CARGO_PKG_VERSION"));

/// Upper bound of the up-front body allocation.
///
/// The Content-Length header is attacker-controlled; the buffer still grows
/// past this as actual bytes arrive.
const MAX_PREALLOC_BYTES: u64 = 1024 * 1024;

fn initial_capacity(total: Option<u64>) -> usize {
    total.unwrap_or(0).min(MAX_PREALLOC_BYTES) as usize
}

/// Downloads content over HTTP(S), streaming bodies to the staging path when
/// one is requested.
#[derive(Debug, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressReporter,
    ) -> BoxFuture<'static, CacheEntry<Payload>> {
        let client = self.client.clone();
        Box::pin(async move {
            tracing::debug!(url = %request.url, "fetching remote content");
            let mut builder = client.get(request.url.clone());
            for (key, value) in &request.headers {
                if let Ok(name) = header::HeaderName::from_bytes(key.as_bytes()) {
                    builder = builder.header(name, value.as_str());
                }
            }
            let response = builder.header(header::USER_AGENT, USER_AGENT).send().await?;

            let status = response.status();
            if !status.is_success() {
                tracing::debug!(url = %request.url, %status, "unexpected status code");
                return Err(error_for_status(status));
            }

            let total = response.content_length();
            let mut transferred = 0u64;
            let mut stream = response.bytes_stream();

            match request.staging_path {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path).await?;
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk?;
                        transferred += chunk.len() as u64;
                        file.write_all(&chunk).await?;
                        progress(Progress { transferred, total });
                    }
                    file.flush().await?;
                    Ok(Payload::File(path))
                }
                None => {
                    let mut body = Vec::with_capacity(initial_capacity(total));
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk?;
                        transferred += chunk.len() as u64;
                        body.extend_from_slice(&chunk);
                        progress(Progress { transferred, total });
                    }
                    Ok(Payload::Bytes(body.into()))
                }
            }
        })
    }
}

fn error_for_status(status: StatusCode) -> CacheError {
    if status == StatusCode::NOT_FOUND {
        CacheError::NotFound
    } else if matches!(status, StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED) {
        CacheError::PermissionDenied(status.to_string())
    } else if status.is_server_error() {
        CacheError::Server(status.to_string())
    } else {
        CacheError::ServiceMissing(status.to_string())
    }
}
