use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "telemetry_sync=info";

/// Uses `RUST_LOG` as given when it is set; otherwise logs this crate at info.
pub fn init_tracing() {
    let filter = filter_for(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn filter_for(rust_log: Option<&str>) -> EnvFilter {
    EnvFilter::new(rust_log.unwrap_or(DEFAULT_DIRECTIVES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_is_taken_as_is() {
        let filter = filter_for(Some("telemetry_sync=debug")).to_string();
        assert!(filter.contains("telemetry_sync=debug"));
        assert!(!filter.contains("info"));
    }

    #[test]
    fn crate_logs_at_info_without_rust_log() {
        assert!(filter_for(None).to_string().contains("telemetry_sync=info"));
    }
}
