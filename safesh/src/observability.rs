//! Logging setup, grounded in the teacher's `observability.rs`: the CLI
//! never prints raw `println!` diagnostics, it emits `tracing` events
//! configured by a small set of environment variables so a caller
//! embedding `safesh` as a subprocess can parse its logs structurally.

use tracing_subscriber::EnvFilter;

/// `SAFESH_LOG_LEVEL` sets the default filter (overridable by the usual
/// `RUST_LOG` syntax via the same variable). `SAFESH_QUIET` suppresses
/// everything below `warn`. `SAFESH_LOG_JSON=1` switches to JSON-lines
/// output, which a host process can parse instead of scraping text.
pub fn init() {
    let default_level = if std::env::var("SAFESH_QUIET").is_ok() {
        "warn"
    } else {
        "info"
    };
    let filter = std::env::var("SAFESH_LOG_LEVEL")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let json = std::env::var("SAFESH_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
