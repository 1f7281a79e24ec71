//! HTTP status check
//!
//! Requests `http://<addr><location>` with an optional `Host` header and
//! accepts the configured status codes, or any 2xx when none are configured.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::header::HOST;
use tracing::trace;

use super::ProbeRunner;
use crate::error::{Error, Result};
use crate::models::Target;

pub struct HttpProbe {
    client: reqwest::Client,
    host: Option<String>,
    location: String,
    accept_codes: Vec<u16>,
}

pub fn create(target: &Target) -> Result<Arc<dyn ProbeRunner>> {
    let client = reqwest::Client::builder()
        .timeout(target.timeout)
        .build()
        .map_err(|e| {
            Error::InvalidTarget(format!("{}: cannot build http client: {e}", target.id))
        })?;

    let location = match target.location.as_deref() {
        None | Some("") => "/".to_string(),
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => format!("/{path}"),
    };

    Ok(Arc::new(HttpProbe {
        client,
        host: target.host.clone().filter(|h| !h.is_empty()),
        location,
        accept_codes: target.accept_codes.clone(),
    }))
}

impl HttpProbe {
    fn accepts(&self, status_code: u16) -> bool {
        if self.accept_codes.is_empty() {
            (200..300).contains(&status_code)
        } else {
            self.accept_codes.contains(&status_code)
        }
    }
}

#[async_trait]
impl ProbeRunner for HttpProbe {
    async fn run(&self, addr: SocketAddr) -> anyhow::Result<String> {
        let url = format!("http://{addr}{}", self.location);
        trace!("checking {url}");

        let mut request = self.client.get(&url);
        if let Some(host) = &self.host {
            request = request.header(HOST, host);
        }

        let response = request.send().await.context("HTTP request failed")?;
        let status = response.status();
        if !self.accepts(status.as_u16()) {
            bail!("unexpected status code: {}", status.as_u16());
        }
        Ok(status.to_string())
    }
}
