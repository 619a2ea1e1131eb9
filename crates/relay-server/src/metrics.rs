//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used by the `/metrics` route. Fails if a recorder is
/// already installed in this process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Connections admitted (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Connections fully closed and unregistered (counter).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Currently registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Broadcasts dispatched (counter).
pub const BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Messages queued to a target (counter).
pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
/// Per-target send failures (counter, labels: kind).
pub const SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";
/// Messages dropped by the transform (counter, labels: kind).
pub const TRANSFORM_FAILURES_TOTAL: &str = "relay_transform_failures_total";
/// Refused or failed accepts (counter, labels: kind).
pub const ACCEPT_FAILURES_TOTAL: &str = "relay_accept_failures_total";
/// Connections ended by a read or write failure (counter, labels: kind).
pub const TRANSPORT_FAILURES_TOTAL: &str = "relay_transport_failures_total";
