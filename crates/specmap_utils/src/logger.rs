use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Targets emitting map events: the library crate and this utility crate.
pub const MAP_TARGETS: [&str; 2] = ["specmap", "specmap_utils"];

/// Directives enabling every map target at `level`, e.g. `specmap=debug,specmap_utils=debug`.
pub fn map_directives(level: &str) -> String {
    MAP_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Filter from explicit directives, falling back to the map targets at `level`
/// when `directives` is missing or does not parse.
pub fn filter_for(directives: Option<&str>, level: &str) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(map_directives(level)))
}

/// Initialise tracing subscriber once per process with map events at `info`.
pub fn init_logging() {
    init_logging_at("info");
}

/// Initialise tracing subscriber once per process.
///
/// `RUST_LOG` wins when set and valid; otherwise only map targets at `level`
/// and above are shown. Targets are printed so arena, generator and profiler
/// events can be told apart.
pub fn init_logging_at(level: &str) {
    INIT.call_once(|| {
        let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

        fmt()
            .with_env_filter(filter_for(rust_log.as_deref(), level))
            .with_target(true)
            .compact()
            .init();
    });
}
