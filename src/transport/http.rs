//! HTTP wire fetch over `reqwest`, trying candidate URLs in order.

use super::{TransportError, WireFetch};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

/// Plain-HTTP chunk fetch. Handles gzip-compressed chunk bodies; encrypted
/// chunks need a deployment-specific [`WireFetch`] that knows the cipher.
#[derive(Default)]
pub struct HttpWireFetch {
    client: reqwest::Client,
}

impl HttpWireFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<Bytes, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        response.bytes().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl WireFetch for HttpWireFetch {
    async fn fetch_chunk(
        &self,
        urls: &[String],
        cipher_key: Option<&Bytes>,
        is_compressed: bool,
    ) -> Result<Bytes, TransportError> {
        if cipher_key.is_some() {
            return Err(TransportError::CipherUnsupported);
        }
        let mut last = String::from("no candidate urls");
        for url in urls {
            match self.get(url).await {
                Ok(body) => {
                    if !is_compressed {
                        return Ok(body);
                    }
                    let mut decoded = Vec::new();
                    GzDecoder::new(body.as_ref())
                        .read_to_end(&mut decoded)
                        .map_err(|e| TransportError::Decompress(e.to_string()))?;
                    return Ok(Bytes::from(decoded));
                }
                Err(e) => {
                    debug!(url, error = %e, "candidate fetch failed");
                    last = e;
                }
            }
        }
        Err(TransportError::AllCandidatesFailed {
            attempts: urls.len(),
            last,
        })
    }
}
