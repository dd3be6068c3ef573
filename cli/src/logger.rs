use crate::config::LoggingConfig;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::fs::OpenOptions;

pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Logs to stderr, and additionally to the configured file when it can be opened.
///
/// `level_override` wins over the configured level.
pub fn setup_logger(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<(), log::SetLoggerError> {
    let level = level_override.unwrap_or(config.level());
    let log_level = parse_level(level);

    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::BrightBlue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr());

    if let Some(file_path) = config.file() {
        match OpenOptions::new().create(true).append(true).open(file_path) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(e) => {
                eprintln!("Warning: Failed to open log file '{file_path}': {e}");
                eprintln!("Continuing without file logging.");
            }
        }
    }

    dispatch.apply()?;
    log::debug!("Logger initialized with level: {level}");
    Ok(())
}
