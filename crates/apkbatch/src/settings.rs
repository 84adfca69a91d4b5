use std::path::PathBuf;

use anyhow::{Context, Result};
use fs_err as fs;
use tracing::{debug, info, instrument};

use crate::models::Settings;

/// Loads and persists `settings.json` in the working directory
#[derive(Debug, Clone)]
pub struct SettingsHandler {
    settings_file_path: PathBuf,
}

impl SettingsHandler {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { settings_file_path: work_dir.join("settings.json") }
    }

    /// Returns the active settings, falling back to defaults when the file is broken.
    /// The load error is handed back so it can be reported once logging is up.
    pub fn load_or_default(&self) -> (Settings, Option<anyhow::Error>) {
        match self.load_settings() {
            Ok(settings) => (settings, None),
            Err(e) => (Settings::default(), Some(e)),
        }
    }

    /// Load settings from file or write defaults if the file doesn't exist
    #[instrument(skip(self))]
    pub fn load_settings(&self) -> Result<Settings> {
        if !self.settings_file_path.exists() {
            info!(path = %self.settings_file_path.display(), "Settings file doesn't exist, using defaults");
            return self.load_default_settings().context("Failed to load default settings");
        }

        info!(path = %self.settings_file_path.display(), "Loading settings from file");
        let file_content =
            fs::read_to_string(&self.settings_file_path).context("Failed to read settings file")?;

        let settings: Settings =
            serde_json::from_str(&file_content).context("Failed to parse settings file")?;
        settings.validate().context("Invalid settings file")?;

        debug!(?settings, "Loaded application settings successfully");
        Ok(settings)
    }

    /// Save settings to file
    #[instrument(skip(self, settings))]
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        info!(path = %self.settings_file_path.display(), "Saving settings to file");
        settings.validate().context("Refusing to save invalid settings")?;
        let settings_json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.settings_file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            info!(path = %parent.display(), "Creating settings directory");
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        fs::write(&self.settings_file_path, settings_json)
            .context("Failed to write settings file")?;

        info!("Saved application settings successfully");
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_default_settings(&self) -> Result<Settings> {
        let settings = Settings::default();
        self.save_settings(&settings)?;
        info!("Default settings loaded and saved");
        Ok(settings)
    }
}
