mod cli;
mod core;

use std::{fmt::Write, io::IsTerminal};

use color_eyre::eyre::Result;
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::debug_fn},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const USER_UI_TARGET: &str = "user-ui";

fn main() -> Result<()> {
    color_eyre::install()?;

    // Progress lines go to stdout as-is, diagnostics to stderr. The message of
    // a user-ui event is written unescaped so its own colours survive.
    let user_ui = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(std::io::stdout().is_terminal())
        .without_time()
        .with_level(false)
        .with_target(false)
        .fmt_fields(debug_fn(|writer, field, value| {
            if field.name() == "message" {
                write!(writer, "{:?}", value)
            } else {
                Ok(())
            }
        }))
        .with_filter(filter_fn(|metadata| metadata.target() == USER_UI_TARGET));
    let diagnostics = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .with_target(false)
        .with_filter(filter_fn(|metadata| metadata.target() != USER_UI_TARGET));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(user_ui)
        .with(diagnostics)
        .init();

    cli::Cli::run()
}
