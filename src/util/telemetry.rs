//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset: lifecycle transitions of this
/// crate at info, everything else at warn.
pub const DEFAULT_DIRECTIVE: &str = "warn,elastic_runtime_core=info";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_DIRECTIVE`]. No-op if a global subscriber is already set, so
/// embedding applications keep theirs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    install(filter);
}

/// Install a fmt subscriber with an explicit filter directive, e.g.
/// `"elastic_runtime_core::data=debug"`. Returns `false` when a subscriber
/// was already installed or the directive does not parse.
pub fn init_tracing_with(directive: &str) -> bool {
    match EnvFilter::try_new(directive) {
        Ok(filter) => install(filter),
        Err(err) => {
            eprintln!("invalid tracing directive {directive:?}: {err}");
            false
        }
    }
}

fn install(filter: EnvFilter) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
