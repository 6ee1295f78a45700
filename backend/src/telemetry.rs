//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directives when `RUST_LOG` is unset.
pub fn default_filter(log_level: &str) -> String {
    format!(
        "doc_vault_backend={level},tower_http=debug,sqlx::query=warn",
        level = log_level
    )
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when present; otherwise the configured log level applies
/// to this crate.
pub fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level).into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_uses_level() {
        let filter = default_filter("warn");
        assert!(filter.starts_with("doc_vault_backend=warn"));
        assert!(EnvFilter::try_new(&filter).is_ok());
    }
}
