use log::{Level, LevelFilter, Metadata, Record};

/// Logger implementation for the demo binary.
struct DeukLogger;

impl log::Log for DeukLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    /// Logs the record by printing it to stderr.
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    /// Flushes the logger (no-op in this case).
    fn flush(&self) {}
}

/// The DeukLogger instance used for logging.
static LOGGER: DeukLogger = DeukLogger;

/// Initializes the logger.
///
/// # Panics
///
/// If there is an error initializing the logger, a panic will occur
/// with the corresponding error message.
pub fn init() {
    let logger_init_result =
        log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));

    match logger_init_result {
        Ok(_) => log::info!("Logger initialized correctly"),
        Err(err) => panic!("Error with initializing logger: {}", err),
    }
}
