//! `nap init`: write a commented `nap.toml`.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use nap_control::ControlError;
use nap_core::config::PROJECT_FILE;
use nap_core::validation::validate_name;
use nap_core::ProjectConfig;

const HEADER: &str = "\
# nap project configuration.
# Read by 'nap app deploy' when the app is first created.
# Command-line flags take precedence over values here.

";

pub fn run(path: &str, name: Option<&str>, force: bool) -> anyhow::Result<ExitCode> {
    let dir = Path::new(path);
    if !dir.is_dir() {
        return Err(ControlError::Validation(format!("{path} is not a directory")).into());
    }
    let name = match name {
        Some(n) => n.to_string(),
        None => dir
            .canonicalize()
            .with_context(|| format!("resolving {path}"))?
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ControlError::Validation("cannot derive an app name; pass --name".into()))?,
    };
    validate_name("app", &name).map_err(ControlError::from)?;

    let file = dir.join(PROJECT_FILE);
    if file.exists() && !force {
        return Err(ControlError::Conflict(format!(
            "{} already exists (use --force to overwrite)",
            file.display()
        ))
        .into());
    }

    let body = ProjectConfig::scaffold(&name).to_toml_string().map_err(ControlError::from)?;
    std::fs::write(&file, format!("{HEADER}{body}")).with_context(|| format!("writing {}", file.display()))?;
    println!("✓ Generated {}", file.display());
    println!("  Deploy with 'nap app deploy {name} {path}'");
    Ok(ExitCode::SUCCESS)
}
