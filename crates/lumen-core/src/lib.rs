// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use tracing_subscriber::{fmt, EnvFilter};

/// Directive used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the process-wide subscriber. `RUST_LOG` wins over `default_filter`.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_tracing(default_filter: Option<&str>) {
    let filter = build_filter(default_filter);
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn build_filter(default_filter: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = default_filter.unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|e| {
            tracing::warn!("bad log filter {directive:?}: {e}; using {DEFAULT_FILTER}");
            EnvFilter::new(DEFAULT_FILTER)
        })
    })
}
