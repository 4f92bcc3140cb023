//! Registrar directory source (spec §6.2): a pluggable way to enumerate
//! candidate registrar endpoints. Shipped as a static list or a URL whose
//! body is a newline-separated `host:port` list.

use crate::error::{CrowError, CrowResult};
use crate::model::RegistrarEndpoint;
use async_trait::async_trait;

#[async_trait]
pub trait RegistrarSource: Send + Sync {
    async fn endpoints(&self) -> CrowResult<Vec<RegistrarEndpoint>>;
}

/// Fixed, single-endpoint source given at construction.
#[derive(Debug, Clone)]
pub struct StaticRegistrarSource {
    endpoints: Vec<RegistrarEndpoint>,
}

impl StaticRegistrarSource {
    pub fn new(endpoints: Vec<RegistrarEndpoint>) -> Self {
        Self { endpoints }
    }

    pub fn single(address: impl Into<String>, port: u16) -> Self {
        Self {
            endpoints: vec![RegistrarEndpoint::new(address, port)],
        }
    }
}

#[async_trait]
impl RegistrarSource for StaticRegistrarSource {
    async fn endpoints(&self) -> CrowResult<Vec<RegistrarEndpoint>> {
        Ok(self.endpoints.clone())
    }
}

/// Fetches a text body over HTTP; each non-empty line is `host:port`.
/// Blank or malformed lines are skipped, never a hard failure — only a
/// transport-level failure (connect, non-2xx) is surfaced.
#[derive(Debug, Clone)]
pub struct UrlRegistrarSource {
    url: String,
    client: reqwest::Client,
}

impl UrlRegistrarSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RegistrarSource for UrlRegistrarSource {
    async fn endpoints(&self) -> CrowResult<Vec<RegistrarEndpoint>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| CrowError::SourceUnreachable(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(CrowError::SourceUnreachable(format!(
                "unexpected status {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|err| CrowError::SourceUnreachable(err.to_string()))?;
        Ok(parse_endpoint_lines(&body))
    }
}

fn parse_endpoint_lines(body: &str) -> Vec<RegistrarEndpoint> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (host, port) = line.rsplit_once(':')?;
            let port: u16 = port.trim().parse().ok()?;
            if host.is_empty() {
                return None;
            }
            Some(RegistrarEndpoint::new(host.trim(), port))
        })
        .collect()
}
