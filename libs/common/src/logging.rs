//! Unified logging module for the auto-deploy tooling
//!
//! Console output always uses the bracketed-level format. When a log directory is
//! configured, a daily-rolling file layer is added (plain text or JSON).

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use url::Url;

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Channel created`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Tool name, used as the file prefix and as the default filter target
    pub tool_name: String,
    /// Console log level
    pub console_level: Level,
    /// File log level
    pub file_level: Level,
    /// Directory for the rolling log file; console only when `None`
    pub log_dir: Option<PathBuf>,
    /// Enable JSON format for the file layer
    pub enable_json: bool,
    /// Colour console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            tool_name: "autodeploy".to_string(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            log_dir: None,
            enable_json: false,
            ansi: true,
        }
    }
}

/// Keeps the non-blocking file writer alive; drop it only on exit
#[must_use = "dropping the guard stops the file logger"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize logging system with configuration
///
/// `RUST_LOG` takes precedence over the configured levels when set.
pub fn init_with_config(config: LogConfig) -> Result<LogGuard, Box<dyn std::error::Error>> {
    let max_level = std::cmp::max(
        LevelFilter::from_level(config.console_level),
        if config.log_dir.is_some() {
            LevelFilter::from_level(config.file_level)
        } else {
            LevelFilter::OFF
        },
    );

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.is_empty() => EnvFilter::try_new(spec)?,
        _ => EnvFilter::try_new(format!(
            "warn,{}={},common={}",
            config.tool_name.replace('-', "_"),
            max_level,
            max_level
        ))?,
    };

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .with_filter(LevelFilter::from_level(config.console_level))
        .boxed();

    let mut file_guard = None;
    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.tool_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);

            let layer = if config.enable_json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_level(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_filter(LevelFilter::from_level(config.file_level))
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .with_filter(LevelFilter::from_level(config.file_level))
                    .boxed()
            };
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    match &config.log_dir {
        Some(dir) => tracing::debug!("Logging: {} @ {}", config.tool_name, dir.display()),
        None => tracing::debug!("Logging: {} (console only)", config.tool_name),
    }

    Ok(LogGuard { _file: file_guard })
}

/// Strip user-info (`user:password@`) from a URL so it can be logged
///
/// Input that does not parse as a URL is returned unchanged.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            // Only fails for URLs that cannot carry credentials anyway
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        },
        Err(_) => raw.to_string(),
    }
}
