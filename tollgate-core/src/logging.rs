//! Unified logging system
//!
//! Structured logging with configurable output format and destination

use crate::error::{ErrorContext, TollgateError, TollgateResult};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to include thread information
    pub include_thread: bool,
    /// Whether to log to file instead of stdout
    pub log_to_file: bool,
    /// Log file path (if log_to_file is true)
    pub log_file_path: Option<String>,
    /// Emit a line with timing when a span closes
    pub enable_span_timing: bool,
    /// Custom filter directives
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            log_to_file: false,
            log_file_path: None,
            enable_span_timing: false,
            filter_directives: vec![
                "tollgate_core=info".to_string(),
                "tollgate_session=info".to_string(),
                "tollgate_web=info".to_string(),
                "tower_http=info".to_string(),
            ],
        }
    }
}

impl LoggingConfig {
    /// Build the env filter; `RUST_LOG` takes precedence over the configured level
    pub fn env_filter(&self) -> TollgateResult<EnvFilter> {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        for directive in &self.filter_directives {
            let parsed = directive.parse().map_err(|e| TollgateError::Config {
                message: format!("Invalid log filter directive '{}'", directive),
                source: Some(Box::new(e)),
                context: ErrorContext::new("logging").with_operation("parse_directive"),
            })?;
            filter = filter.add_directive(parsed);
        }

        Ok(filter)
    }

    fn make_writer(&self) -> TollgateResult<BoxMakeWriter> {
        if !self.log_to_file {
            return Ok(BoxMakeWriter::new(std::io::stdout));
        }

        let Some(log_path) = &self.log_file_path else {
            return Err(TollgateError::Config {
                message: "log_file_path must be specified when log_to_file is true".to_string(),
                source: None,
                context: ErrorContext::new("logging").with_operation("open_log_file"),
            });
        };

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(BoxMakeWriter::new(Mutex::new(file)))
    }
}

/// Initialize the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> TollgateResult<()> {
    let filter = config.env_filter()?;
    let writer = config.make_writer()?;
    let registry = tracing_subscriber::registry().with(filter);

    let layer = fmt::layer()
        .with_span_events(if config.enable_span_timing {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread)
        .with_ansi(!config.log_to_file)
        .with_writer(writer);

    let result = match config.format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
    };

    result.map_err(|e| TollgateError::Config {
        message: "Failed to install tracing subscriber".to_string(),
        source: Some(Box::new(e)),
        context: ErrorContext::new("logging").with_operation("init"),
    })
}
