use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_level` applies to the
/// workspace crates and `warn` to everything else. A subscriber installed
/// earlier (by a test harness, say) stays in place.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,enact={level},enact_server={level},services={level},db={level},utils={level}",
            level = default_level
        ))
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
    {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_keeps_first_subscriber() {
        init_tracing("debug");
        init_tracing("trace");
        assert!(tracing::dispatcher::has_been_set());
    }
}
