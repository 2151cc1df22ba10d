//! Handles all user-facing output for the CLI.
//!
//! Status chatter goes to stdout and is suppressed by `--silent`; errors
//! always render to stderr in the canonical format (see
//! `errors::print_error`).

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Prints a progress line unless silenced.
pub fn status(silent: bool, message: &str) {
    if silent {
        return;
    }
    println!("{}", message);
}

/// Prints a green summary line unless silenced.
pub fn success(silent: bool, message: &str) {
    if silent {
        return;
    }
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    println!("{}", message);
    let _ = stdout.reset();
}
