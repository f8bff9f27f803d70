use clap::ValueEnum;
use color_eyre::eyre::{Context, Result};
use owo_colors::{OwoColorize, Stream, Style};
use tracing::info;

use crate::core::BuildDryRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Plain,
    Json,
}

pub(crate) fn output_dry_run(dry_run: &BuildDryRun, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Plain => output_plain(dry_run),
        OutputFormat::Json => output_json(dry_run)?,
    }
    Ok(())
}

fn output_plain(dry_run: &BuildDryRun) {
    if let Some(chapters) = dry_run.chapters.as_ref() {
        info!(target: "user-ui",
            "{} {}",
            "Chapters:".if_supports_color(Stream::Stdout, |text| text
                .style(Style::new().cyan().bold())),
            chapters
        );
    }
    if dry_run.order.is_empty() {
        info!(target: "user-ui", "No packages to build");
        return;
    }
    let total = dry_run.order.len();
    for (index, entry) in dry_run.order.iter().enumerate() {
        let chapter = entry
            .chapter
            .map(|chapter| format!("chapter {:>2} ", chapter))
            .unwrap_or_default();
        let (action, style) = match (entry.recipe.as_ref(), entry.command_file.as_ref()) {
            (Some(recipe), _) => (
                format!(
                    "recipe {} ({} steps)",
                    recipe,
                    entry.steps.unwrap_or_default()
                ),
                Style::new().green(),
            ),
            (None, Some(command_file)) => (
                format!("generic {}", command_file.display()),
                Style::new().yellow(),
            ),
            (None, None) => (
                "generic (no command cache configured)".to_string(),
                Style::new().red(),
            ),
        };
        info!(target: "user-ui",
            "[{:>3}/{}] {}{} {}",
            index + 1,
            total,
            chapter.if_supports_color(Stream::Stdout, |text| text.italic()),
            entry
                .package
                .if_supports_color(Stream::Stdout, |text| text.bold()),
            action.if_supports_color(Stream::Stdout, |text| text.style(style))
        );
    }
}

fn output_json(dry_run: &BuildDryRun) -> Result<()> {
    let json = serde_json::to_string_pretty(dry_run).context("Failed to serialize build plan")?;
    println!("{}", json);
    Ok(())
}
