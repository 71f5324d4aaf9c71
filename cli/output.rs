use anyhow::{Context, Result};
use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use aifeeder_core::output_formats::{self, OutputFormat};
use aifeeder_core::{Config, SkippedEntry};

/// Serializes `value` using the effective `[output]` settings.
pub fn render<T: Serialize>(value: &T, config: &Config) -> Result<String> {
    let format: OutputFormat = config.output.format.parse()?;
    let pretty_json = !config.output.json_minify;
    Ok(output_formats::serialize(value, format, pretty_json)?)
}

pub fn print_or_save<T: Serialize>(
    value: &T,
    config: &Config,
    output_path: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let content = render(value, config)?;
    match output_path {
        Some(path) => {
            write_to_file(path, &content)?;
            if !quiet {
                println!(
                    "{} Tree saved to: {}",
                    "✅".green(),
                    path.display().to_string().blue()
                );
            }
        }
        None => write_to_stdout(&content)?,
    }
    Ok(())
}

pub fn write_to_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("Failed to create file {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to file {}", path.display()))?;
    Ok(())
}

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

pub fn print_skip_table(skipped: &[SkippedEntry]) {
    println!("{}", "\n--- Skipped Entries ---".green().bold().underline());
    if skipped.is_empty() {
        println!("{}", "(None)".dimmed());
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Path").fg(Color::Green),
        Cell::new("Kind").fg(Color::Green),
        Cell::new("Reason").fg(Color::Green),
        Cell::new("Detail").fg(Color::Green),
    ]);
    for entry in skipped {
        let reason_color = if entry.reason.is_failure() {
            Color::Red
        } else {
            Color::Yellow
        };
        table.add_row(vec![
            Cell::new(entry.path.display()).fg(Color::Cyan),
            Cell::new(if entry.is_dir { "dir" } else { "file" }),
            Cell::new(entry.reason.code()).fg(reason_color),
            Cell::new(entry.detail.as_deref().unwrap_or("")).fg(Color::DarkGrey),
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use aifeeder_core::OutputTree;
    use tempfile::TempDir;

    #[test]
    fn render_respects_format_and_minify() {
        let mut tree = OutputTree::new();
        tree.insert_file(&[], "main.rs", "fn main() {}".into()).unwrap();
        let mut config = Config::default();
        config.output.json_minify = true;
        assert_eq!(render(&tree, &config).unwrap(), r#"{"main.rs":"fn main() {}"}"#);

        config.output.format = "yaml".into();
        assert!(render(&tree, &config).unwrap().starts_with("main.rs:"));

        config.output.format = "xml".into();
        assert!(render(&tree, &config).is_err());
    }

    #[test]
    fn write_to_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/tree.json");
        write_to_file(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "{}");
    }
}
