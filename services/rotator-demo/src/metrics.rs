//! Prometheus exposition for the pool counters
//!
//! The demo installs a global recorder so the `key_pool_*` counters emitted
//! by the library are captured, then prints the rendered text at exit.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and register the pool's metric descriptions.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    key_pool::describe_metrics();
    Ok(handle)
}
