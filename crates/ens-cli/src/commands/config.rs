use std::fs;

use anyhow::{anyhow, Context, Result};
use ens_batch::EngineConfig;
use ens_cli::cli::ConfigCommands;

pub fn handle(command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Init { out, force } => {
            if out.exists() && !force {
                return Err(anyhow!(
                    "{} already exists; pass --force to overwrite",
                    out.display()
                ));
            }
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory '{}'", parent.display()))?;
            }
            let text = EngineConfig::default().to_toml_string()?;
            fs::write(out, text).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote default configuration to {}", out.display());
            Ok(())
        }
        ConfigCommands::Validate { path } => {
            let config = EngineConfig::load_from(path)?;
            let problems = config.validate();
            if problems.is_empty() {
                println!("{} is valid", path.display());
                return Ok(());
            }
            for problem in &problems {
                println!("  - {problem}");
            }
            Err(anyhow!(
                "{} has {} problem(s)",
                path.display(),
                problems.len()
            ))
        }
    }
}
