use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    metrics::describe_counter!(
        "dispatcher_messages_total",
        "Pending submissions handled by the dispatcher, by outcome"
    );
    metrics::describe_counter!("dispatcher_achievements_total", "Achievements recorded");
    metrics::describe_histogram!(
        "dispatcher_cycle_duration_seconds",
        "Wall time of one dispatcher polling cycle"
    );
    metrics::describe_counter!("submissions_total", "Submissions accepted by the API");

    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
