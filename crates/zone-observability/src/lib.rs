use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;
use zone_config::ServiceConfig;

/// Store writes, labelled with `op`.
pub const MUTATIONS_TOTAL: &str = "zone_store_mutations_total";
pub const NOTIFICATIONS_TOTAL: &str = "zone_store_notifications_total";

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
    pub metrics_addr: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_service(config: &ServiceConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            environment: config.environment.to_string(),
            log_level: config.log_level.clone(),
            metrics_addr: config.metrics_addr.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityHandle {
    pub service_name: String,
    pub environment: String,
    pub metrics_listener: Option<SocketAddr>,
}

/// Installs the stderr log subscriber and, when `metrics_addr` parses, the
/// Prometheus exporter. Safe to call twice; the second subscriber is ignored.
pub fn init(config: &ObservabilityConfig) -> ObservabilityHandle {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let metrics_listener = metrics_listener(config).filter(|addr| install_exporter(config, *addr));
    if metrics_listener.is_some() {
        describe_metrics();
    }

    ObservabilityHandle {
        service_name: config.service_name.clone(),
        environment: config.environment.clone(),
        metrics_listener,
    }
}

pub fn log_startup(handle: &ObservabilityHandle) {
    match handle.metrics_listener {
        Some(addr) => tracing::info!(
            service = %handle.service_name,
            environment = %handle.environment,
            metrics = %addr,
            "Zone service starting"
        ),
        None => tracing::info!(
            service = %handle.service_name,
            environment = %handle.environment,
            "Zone service starting without metrics"
        ),
    }
}

pub fn describe_metrics() {
    describe_counter!(
        MUTATIONS_TOTAL,
        Unit::Count,
        "Zone store writes, labelled by operation"
    );
    describe_counter!(
        NOTIFICATIONS_TOTAL,
        Unit::Count,
        "Geometry change notifications delivered to listeners"
    );
}

fn metrics_listener(config: &ObservabilityConfig) -> Option<SocketAddr> {
    let raw = config.metrics_addr.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(err) => {
            tracing::warn!(value = raw, error = %err, "Ignoring invalid ZONE_METRICS_ADDR");
            None
        }
    }
}

fn install_exporter(config: &ObservabilityConfig, addr: SocketAddr) -> bool {
    let installed = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", config.service_name.clone())
        .add_global_label("environment", config.environment.clone())
        .install();
    if let Err(err) = &installed {
        tracing::warn!(%addr, error = %err, "Prometheus exporter not started");
    }
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_config::Environment;

    fn config(metrics_addr: Option<&str>) -> ObservabilityConfig {
        ObservabilityConfig {
            service_name: "zone-admin".to_string(),
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            metrics_addr: metrics_addr.map(str::to_string),
        }
    }

    #[test]
    fn metrics_listener_needs_a_socket_addr() {
        assert_eq!(metrics_listener(&config(None)), None);
        assert_eq!(metrics_listener(&config(Some("  "))), None);
        assert_eq!(metrics_listener(&config(Some("not-an-addr"))), None);
        assert_eq!(
            metrics_listener(&config(Some("127.0.0.1:9464"))),
            Some(SocketAddr::from(([127, 0, 0, 1], 9464)))
        );
    }

    #[test]
    fn takes_names_from_the_service_config() {
        let service = ServiceConfig {
            service_name: "zone-admin".to_string(),
            environment: Environment::Prod,
            log_level: "warn".to_string(),
            metrics_addr: Some("0.0.0.0:9464".to_string()),
            data_dir: ".".to_string(),
        };
        let config = ObservabilityConfig::from_service(&service);
        assert_eq!(config.environment, "prod");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.metrics_addr.as_deref(), Some("0.0.0.0:9464"));
    }
}
