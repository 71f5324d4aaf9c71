use crate::cli_args::ConfigArgs;
use crate::output::{write_to_file, write_to_stdout};
use aifeeder_core::Config;
use anyhow::{Context, Result};
use colored::*;
use std::io::{self, Write};
use std::path::Path;

pub fn handle_config_command(args: &ConfigArgs, project_root: &Path, quiet: bool) -> Result<()> {
    let content = Config::template()
        .to_toml_string()
        .context("Failed to render default configuration")?;

    if !args.save {
        return write_to_stdout(&content);
    }

    let save_path = Config::default_config_path(project_root);
    if save_path.exists() {
        if quiet {
            anyhow::bail!(
                "Target file '{}' exists. Overwrite prevented in quiet mode.",
                save_path.display()
            );
        }
        print!(
            "{} Config file already exists at '{}'. Overwrite? [{}/{}] ",
            "⚠️".yellow(),
            save_path.display().to_string().cyan(),
            "y".green(),
            "N".red()
        );
        io::stdout().flush().context("Failed to flush stdout")?;
        let mut response = String::new();
        io::stdin()
            .read_line(&mut response)
            .context("Failed to read user input")?;
        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Save cancelled.");
            return Ok(());
        }
    }

    write_to_file(&save_path, &content)?;
    if !quiet {
        println!(
            "{} Default config saved to: {}",
            "✅".green(),
            save_path.display().to_string().blue()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn save_writes_a_loadable_config() {
        let dir = TempDir::new().unwrap();
        handle_config_command(&ConfigArgs { project_config: Default::default(), save: true }, dir.path(), true)
            .unwrap();
        let path = Config::default_config_path(dir.path());
        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, Config::template());
    }

    #[test]
    fn quiet_save_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = Config::default_config_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "# mine").unwrap();
        let args = ConfigArgs { project_config: Default::default(), save: true };
        assert!(handle_config_command(&args, dir.path(), true).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine");
    }
}
