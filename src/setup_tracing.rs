use time::format_description::parse;
use tracing_subscriber::fmt::time::OffsetTime;

/// Install the global subscriber.
///
/// `log_level` is the default filter; `RUST_LOG` overrides it
/// (e.g. `RUST_LOG=jobflow=trace` to see every buffered operation).
pub fn setup_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
        // Filter out noisy third-party logs
        .add_directive("sqlx::query=warn".parse().expect("valid directive"))
        .add_directive("sea_orm_migration::migrator=warn".parse().expect("valid directive"));

    let timer_format = parse("[hour]:[minute]:[second].[subsecond digits:2]")
        .expect("valid time format description");

    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false) // Remove module paths for cleaner output
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_ansi(true)
        .with_timer(OffsetTime::new(
            time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC),
            timer_format,
        ))
        .compact()
        .try_init();

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
