/// User-facing warnings, written to stderr.
///
/// Unlike `tracing` output these are always shown, regardless of verbosity.
macro_rules! warn_user {
    ($($arg:tt)*) => {{
        use owo_colors::OwoColorize;
        anstream::eprintln!("{}{} {}", "warning".yellow().bold(), ":".bold(), format!($($arg)*));
    }};
}

pub(crate) use warn_user;
