//! Conversion through an HTTP service.
//!
//! Protocol: `POST <endpoint>` with a multipart form holding the primary
//! artifact as `files` and the target extension as `format`. A 2xx response
//! body is the converted document.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{info, instrument, warn};
use url::Url;

use darwin_shared::{DarwinError, OutputFormat, Result};

use crate::{Converter, artifact_stem, publish_bytes, timeout_seconds};

/// User-Agent string for conversion requests.
const USER_AGENT: &str = concat!("Darwin/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt carried in an error.
const MAX_BODY_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct RemoteConverter {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl RemoteConverter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| DarwinError::config(format!("invalid converter endpoint `{endpoint}`: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DarwinError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> DarwinError {
        if e.is_timeout() {
            DarwinError::ConversionTimeout {
                seconds: timeout_seconds(self.timeout),
            }
        } else if e.is_connect() {
            DarwinError::unavailable(format!("cannot reach {}: {e}", self.endpoint))
        } else {
            DarwinError::conversion_failed(format!("request to {} failed: {e}", self.endpoint))
        }
    }
}

#[async_trait]
impl Converter for RemoteConverter {
    fn name(&self) -> &str {
        "remote"
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn convert(
        &self,
        input: &Path,
        target: OutputFormat,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let stem = artifact_stem(input)?;
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| DarwinError::io(input, e))?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(OutputFormat::PRIMARY.media_type())
            .map_err(|e| DarwinError::conversion_failed(format!("invalid upload: {e}")))?;
        let form = Form::new()
            .part("files", part)
            .text("format", target.extension().to_string());

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "conversion service rejected the document");
            let body: String = body.trim().chars().take(MAX_BODY_CHARS).collect();
            return Err(DarwinError::conversion_failed(format!("HTTP {status}: {body}")));
        }

        let converted = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        if converted.is_empty() {
            return Err(DarwinError::ConversionOutputMissing {
                expected: out_dir.join(format!("{stem}.{}", target.extension())),
            });
        }

        let path = publish_bytes(&converted, out_dir, stem, target)?;
        info!(path = %path.display(), bytes = converted.len(), "converted artifact");
        Ok(path)
    }
}
