use std::path::PathBuf;

use directories::ProjectDirs;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("could not determine a home directory for application data")]
pub struct NoHomeDir;

fn project_dirs() -> Result<ProjectDirs, NoHomeDir> {
    ProjectDirs::from("org", "enact", "enact").ok_or(NoHomeDir)
}

/// Directory holding the local database.
pub fn asset_dir() -> Result<PathBuf, NoHomeDir> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Directory holding `config.toml`.
pub fn config_dir() -> Result<PathBuf, NoHomeDir> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn default_config_path() -> Result<PathBuf, NoHomeDir> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn default_database_path() -> Result<PathBuf, NoHomeDir> {
    Ok(asset_dir()?.join("enact.db"))
}
