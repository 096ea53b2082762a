use std::io;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Install the global subscriber.
///
/// Logs go to stderr unless `to_stdout` is set, so parsed output on stdout
/// stays machine readable.
pub fn setup_logging(verbose_level: u8, to_stdout: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let filter_str = match verbose_level {
            0 => "warn,chat_stream=info,upstream=info",
            1 => "info,chat_stream=debug,upstream=debug",
            _ => "debug,chat_stream=trace,upstream=trace",
        };
        tracing_subscriber::EnvFilter::new(filter_str)
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    let subscriber: SubscriberBuilder<_, _, _, fn() -> Box<dyn io::Write + Send>> = if to_stdout {
        subscriber.with_writer(|| Box::new(io::stdout()) as Box<dyn io::Write + Send>)
    } else {
        subscriber.with_writer(|| Box::new(io::stderr()) as Box<dyn io::Write + Send>)
    };

    if let Err(e) = subscriber.try_init() {
        eprintln!("WARN: logging already initialized, keeping the existing subscriber: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice() {
        setup_logging(0, false);
        setup_logging(2, true);
        tracing::info!("still logging after a second setup");
    }
}
