//! Timestamp authority client used when `--timestamp-authority` is set.

use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_CONTENT_TYPE: &str = "application/timestamp-query";

/// Exchanges a digest for a timestamp token.
pub trait TimestampAuthority: Send + Sync {
    fn timestamp(
        &self,
        url: &str,
        digest: &[u8],
    ) -> Result<Vec<u8>, TimestampError>;
}

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("timestamp request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("timestamp authority {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Posts the digest to the authority URL and returns the response body.
#[derive(Debug, Clone)]
pub struct HttpTimestampAuthority {
    timeout: Duration,
}

impl Default for HttpTimestampAuthority {
    fn default() -> Self { Self { timeout: REQUEST_TIMEOUT } }
}

impl HttpTimestampAuthority {
    pub fn with_timeout(timeout: Duration) -> Self { Self { timeout } }
}

impl TimestampAuthority for HttpTimestampAuthority {
    fn timestamp(
        &self,
        url: &str,
        digest: &[u8],
    ) -> Result<Vec<u8>, TimestampError> {
        let http = |source| TimestampError::Http {
            url: url.to_owned(),
            source,
        };
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(http)?;
        let response = client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, QUERY_CONTENT_TYPE)
            .body(digest.to_vec())
            .send()
            .map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimestampError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let token = response.bytes().map_err(http)?;
        debug!(url, len = token.len(), "received timestamp token");
        Ok(token.to_vec())
    }
}
