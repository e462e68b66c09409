use tts_benchmarks::{ConfigError, HarnessError};

/// Exit code for a failed command
///
/// Configuration problems exit with 2, report I/O with 3, an interrupted run
/// with 130 and everything else with 1.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<HarnessError>() {
            return e.exit_code();
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return 3;
        }
    }
    1
}

/// Format error for user-friendly display
pub fn format_error(error: &anyhow::Error) -> String {
    let config_error = error.chain().find_map(|c| {
        c.downcast_ref::<ConfigError>().or_else(|| match c.downcast_ref::<HarnessError>() {
            Some(HarnessError::Config(e)) => Some(e),
            _ => None,
        })
    });

    match config_error {
        Some(ConfigError::UnknownSelection { .. }) => {
            format!("{}\n\nRun 'ttsbench list' to see the available services and tests.", describe(error))
        }
        Some(_) => format!(
            "{}\n\nRun 'ttsbench validate' to check your configuration, or 'ttsbench config' to write a fresh one.",
            describe(error)
        ),
        None if exit_code(error) == 130 => "Run interrupted by user, no report written.".to_string(),
        None => describe(error),
    }
}

/// The error chain on one line, skipping causes already spelled out above them
fn describe(error: &anyhow::Error) -> String {
    let mut message = String::new();
    for cause in error.chain() {
        let text = cause.to_string();
        if message.contains(&text) {
            continue;
        }
        if !message.is_empty() {
            message.push_str(": ");
        }
        message.push_str(&text);
    }
    message
}
