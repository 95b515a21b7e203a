use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Published CSV export of the brew sheet.
pub const DEFAULT_CSV_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vSVe8hHHlMGQDDF7v-Uq9Pocrhkpmfi9OeWlDiOwKGRO9A6JnyNnuP0AStsrGLAn7BMXwjmBMkRXArK/pub?gid=0&single=true&output=csv";

/// Script endpoint that upserts one brew row per POST.
pub const DEFAULT_SCRIPT_URL: &str = "https://script.google.com/macros/s/AKfycbykXb0YeMoDNOaoIhpWwQIkeJnJCh8eJGn5LkhLsE6Ee-nkBFqdL1zKzbCbmTCzDYKT/exec";

pub struct Config {
    pub data_dir: PathBuf,
    pub cache_db_path: PathBuf,
    pub csv_url: String,
    pub script_url: String,
}

impl Config {
    pub fn load(csv_url: Option<String>, script_url: Option<String>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "brewlog").context("Could not determine home directory")?;
        Self::in_dir(proj_dirs.data_dir().to_path_buf(), csv_url, script_url)
    }

    fn in_dir(
        data_dir: PathBuf,
        csv_url: Option<String>,
        script_url: Option<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let cache_db_path = data_dir.join("cache.db");

        Ok(Config {
            data_dir,
            cache_db_path,
            csv_url: csv_url.unwrap_or_else(|| DEFAULT_CSV_URL.to_string()),
            script_url: script_url.unwrap_or_else(|| DEFAULT_SCRIPT_URL.to_string()),
        })
    }
}
