//! TCP connect check

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

use super::ProbeRunner;
use crate::error::Result;
use crate::models::Target;

/// Succeeds when the TCP handshake completes
pub struct TcpProbe;

pub fn create(_target: &Target) -> Result<Arc<dyn ProbeRunner>> {
    Ok(Arc::new(TcpProbe))
}

#[async_trait]
impl ProbeRunner for TcpProbe {
    async fn run(&self, addr: SocketAddr) -> anyhow::Result<String> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {addr} failed"))?;
        trace!("connected to {addr}");
        drop(stream);
        Ok("ok".to_string())
    }
}
