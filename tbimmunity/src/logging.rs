use parking_lot::Mutex;

use crate::{config::ExtensionConfig, errors::ConfigError, plugininfo};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open log file: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs the process logger. Once that succeeded, later calls are
/// no-ops; a failed attempt can be retried with a fixed config.
///
/// A logger that some other component already installed is kept.
pub fn init(config: &ExtensionConfig) -> Result<(), LoggingError> {
    static INITIALIZED: Mutex<bool> = parking_lot::const_mutex(false);

    init_once(&INITIALIZED, config)
}

fn init_once(initialized: &Mutex<bool>, config: &ExtensionConfig) -> Result<(), LoggingError> {
    let mut initialized = initialized.lock();
    if *initialized {
        return Ok(());
    }

    setup(config)?;
    *initialized = true;
    Ok(())
}

fn setup(config: &ExtensionConfig) -> Result<(), LoggingError> {
    let level = config.level_filter()?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}][{}:{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                plugininfo::EXTENSION_LOG_TAG,
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(log_file) = &config.log_file {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    match dispatch.apply() {
        Ok(()) => {
            log::info!(
                "{} {} logging at {}",
                plugininfo::EXTENSION_NAME,
                plugininfo::EXTENSION_VERSION,
                level
            );
            Ok(())
        }
        Err(err) => {
            log::warn!("Logger already installed, keeping it: {}", err);
            Ok(())
        }
    }
}
