//! Structured logging initialization for midimap.
//!
//! Supports both human-friendly and machine-readable (JSON) output formats,
//! with TTY detection and verbosity control.

use std::io::{self, IsTerminal};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used for `PrintMessage` actions so they can be filtered separately.
pub const MESSAGE_TARGET: &str = "midimap::message";

/// Build the default filter directive for a verbosity level.
///
/// `quiet` wins over `verbose`. Messages emitted by `PrintMessage` bindings
/// stay visible at info level unless quiet mode is on.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "midimap=error";
    }
    match verbose {
        0 => "midimap=info",
        1 => "midimap=debug",
        _ => "midimap=trace",
    }
}

/// Initialize the tracing subscriber based on CLI flags and environment.
///
/// # Arguments
///
/// * `json` - If true, output structured JSON logs for machine consumption
/// * `verbose` - Verbosity level: 0 = info, 1 = debug, 2+ = trace
/// * `quiet` - If true, suppress non-essential output (only errors)
///
/// `RUST_LOG` overrides the computed filter (e.g. "midimap=debug,midir=warn").
///
/// | Mode | TTY | Output |
/// |------|-----|--------|
/// | JSON | any | JSON lines to stderr |
/// | Human | yes | Pretty colored output to stderr |
/// | Human | no | Compact plain output to stderr |
pub fn init_logging(json: bool, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    } else if io::stderr().is_terminal() {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_thread_names(true)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    } else {
        // Piped or redirected
        let fmt_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_writer(io::stderr);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    }
}
