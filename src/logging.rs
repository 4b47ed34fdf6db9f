//! A default logger for applications that don't install their own.

use fern::colors::{Color, ColoredLevelConfig};
use std::sync::Once;

static INITIALIZE_ONCE: Once = Once::new();

/// Install a logger that writes to stderr, coloring levels when stderr
/// is a terminal.
///
/// This fails if a logger has already been installed for the process.
pub fn setup_logger(level: log::LevelFilter) -> Result<(), fern::InitError> {
    let mut colors = ColoredLevelConfig::new();
    colors.info = Color::Blue;
    let tty = atty::is(atty::Stream::Stderr);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            if tty {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().to_rfc3339(),
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().to_rfc3339(),
                    record.level(),
                    record.target(),
                    message
                ))
            }
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

/// Install the stderr logger at `Info` the first time this is called.
///
/// Failing to install it, e.g. because the application already has a
/// logger, is not an error: the timer works the same either way.
pub(crate) fn setup_logger_once() {
    INITIALIZE_ONCE.call_once(|| {
        let _ = setup_logger(log::LevelFilter::Info);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_not_fatal() {
        setup_logger_once();
        setup_logger_once();

        // whichever logger won, a second install is rejected
        assert!(setup_logger(log::LevelFilter::Debug).is_err());

        info!("logger installed");
    }
}
