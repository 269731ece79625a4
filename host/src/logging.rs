use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::HostConfig;
use crate::error::{HostError, HostResult};

/// Crates whose records a bare `log_level` applies to. Everything else stays
/// at `warn`.
const CATALOG_TARGETS: [&str; 2] = ["catalog_core", "catalog_host"];

/// Installs the JSON subscriber. `log` records from `catalog_core` are
/// bridged into it.
pub fn init_logging(config: &HostConfig) -> HostResult<()> {
    let env_filter = build_env_filter(config)?;
    let writer = make_writer(config)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_level(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(writer),
        )
        .try_init()
        .map_err(|err| HostError::Logger(err.to_string()))?;

    log::debug!("logging to {}", describe_sink(config));
    Ok(())
}

fn make_writer(config: &HostConfig) -> HostResult<BoxMakeWriter> {
    let Some(path) = config.log_file() else {
        return Ok(BoxMakeWriter::new(io::stdout));
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

fn describe_sink(config: &HostConfig) -> String {
    config
        .log_file()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| String::from("stdout"))
}

/// A bare level such as `debug` is scoped to the catalog crates; anything
/// with a target or several directives is passed through untouched.
fn filter_directive(log_level: Option<&str>) -> String {
    let level = log_level.map(str::trim).unwrap_or("info");
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let mut directive = String::from("warn");
    for target in CATALOG_TARGETS {
        directive.push_str(&format!(",{target}={level}"));
    }
    directive
}

fn build_env_filter(config: &HostConfig) -> HostResult<EnvFilter> {
    let directive = filter_directive(config.log_level.as_deref());
    EnvFilter::try_new(&directive)
        .map_err(|err| HostError::Logger(format!("invalid log level '{directive}': {err}")))
}
