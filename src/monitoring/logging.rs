// DANS : src/monitoring/logging.rs
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Installe le subscriber global. Le filtre vient de RUST_LOG, sinon `default_directive`.
/// En JSON, chaque span `#[instrument]` émet une ligne à sa fermeture (avec sa durée).
pub fn setup_logging(default_directive: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);

    // `try_init` : un second appel (tests, binaire relancé) ne doit pas paniquer.
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}
