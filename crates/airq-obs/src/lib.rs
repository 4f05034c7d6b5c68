use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "info,airq=debug,sqlx::query=warn";

/// Initialize logging for a service.
/// - RUST_LOG respected; defaults to [`DEFAULT_FILTER`]
/// - AIRQ_LOG_FORMAT=json switches to JSON lines, otherwise human-readable
///
/// Calling it twice keeps the first subscriber.
pub fn init(service_name: &str) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let json = wants_json(std::env::var("AIRQ_LOG_FORMAT").ok().as_deref());

    let registry = tracing_subscriber::registry().with(EnvFilter::new(env_filter));
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    if installed.is_ok() {
        tracing::info!(service = %service_name, json, "Logging initialized");
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_selection() {
        assert!(wants_json(Some("json")));
        assert!(wants_json(Some("JSON")));
        assert!(!wants_json(Some("pretty")));
        assert!(!wants_json(None));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init("airq-test");
        init("airq-test");
    }
}
