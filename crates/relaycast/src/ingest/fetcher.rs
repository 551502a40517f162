use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use tracing::trace;
use url::Url;

use crate::config::IngestConfig;
use crate::error::IngestError;

/// Source of playlist and segment bodies.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, IngestError>;
}

/// Plain HTTP(S) GET with a body size cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_size: usize,
}

impl HttpFetcher {
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("relaycast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config.max_body_size))
    }

    pub fn with_client(client: Client, max_body_size: usize) -> Self {
        Self {
            client,
            max_body_size,
        }
    }

    async fn read_body(&self, url: &Url, response: reqwest::Response) -> Result<Bytes, IngestError> {
        let too_large = || IngestError::BodyTooLarge {
            url: url.to_string(),
            limit: self.max_body_size,
        };

        let declared = response.content_length().unwrap_or(0) as usize;
        if declared > self.max_body_size {
            return Err(too_large());
        }

        let mut buffer = BytesMut::with_capacity(declared);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buffer.len() + chunk.len() > self.max_body_size {
                return Err(too_large());
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, IngestError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::http_status(status, url.as_str()));
        }
        let body = self.read_body(url, response).await?;
        trace!(%url, len = body.len(), "Fetched");
        Ok(body)
    }
}
