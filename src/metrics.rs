// src/metrics.rs
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder with its own `/metrics` listener on
/// `addr`. Must run inside a tokio runtime.
pub fn install(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: install exporter on {addr}"))?;
    crate::ingest::ensure_metrics_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
