use std::sync::Once;

use env_logger::{Builder, WriteStyle};
use log::LevelFilter;

/// Modules that log per draw or per resource at `info`.
const NOISY_MODULES: &[&str] = &["wgpu_core", "wgpu_hal", "naga"];

/// Logger setup for binaries.
///
/// `env_filter` uses `env_logger` directives, e.g. `"strata_vector=trace"`.
/// When unset, `RUST_LOG` is consulted before the built-in default.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            env_filter: Some(filter.into()),
            ..Self::default()
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global `env_logger` once; later calls do nothing.
///
/// Library crates only use the `log` macros.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = Builder::new();
        match config.env_filter.or_else(|| std::env::var("RUST_LOG").ok()) {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => apply_default_filters(&mut builder),
        }
        builder.write_style(config.write_style);
        builder.init();

        log::debug!("logging initialized");
    });
}

fn apply_default_filters(builder: &mut Builder) {
    builder.filter_level(LevelFilter::Info);
    for module in NOISY_MODULES {
        builder.filter_module(module, LevelFilter::Warn);
    }
}
