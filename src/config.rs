use std::{
    fs::{create_dir_all, File},
    io::{BufReader, Write},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use home::home_dir;
use serde::{Deserialize, Serialize};

use crate::saber::difficulty::{DifficultyBuckets, DEFAULT_DIFFICULTY_BOUNDS};
use crate::saber::placement::PlacementConfig;
use crate::ConvertError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub placement: PlacementConfig,
    /// Overall difficulty thresholds between Easy, Normal, Hard, Expert and ExpertPlus
    pub difficulty_bounds: [f64; 4],
    pub ffmpeg_path: PathBuf,
    pub audio_timeout_secs: u64,
    /// Side of the square cover in pixels
    pub cover_size: u32,
    /// Beatmap sets converted in parallel, all cores when unset
    pub jobs: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            placement: PlacementConfig::default(),
            difficulty_bounds: DEFAULT_DIFFICULTY_BOUNDS,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio_timeout_secs: 120,
            cover_size: 512,
            jobs: None,
        }
    }
}

impl Config {
    // folder placed in $HOME directory
    const FOLDER: &'static str = ".osu2saber";

    fn get_base_path() -> Result<PathBuf, ConvertError> {
        let home = home_dir()
            .ok_or_else(|| ConvertError::Config("Could not find home directory".to_string()))?;
        let path = home.join(Self::FOLDER);
        Ok(path)
    }

    fn get_path() -> Result<PathBuf, ConvertError> {
        let base = Self::get_base_path()?;
        Ok(base.join("config.json"))
    }

    /// Creates config if it does not exist
    pub fn read_config() -> Result<Self, ConvertError> {
        let base_path = Self::get_base_path()?;
        if !base_path.exists() {
            create_dir_all(base_path)?;
        }
        let config_path = Self::get_path()?;
        if !config_path.exists() {
            log::info!("Creating default configuration {}", config_path.display());
            Config::default().save_config(&config_path)?;
        }
        Self::from_path(&config_path)
    }

    /// Explicit configuration file, must exist
    pub fn from_path(path: &Path) -> Result<Self, ConvertError> {
        let file = File::open(path).map_err(|err| {
            ConvertError::Config(format!("Could not open configuration {}: {err}", path.display()))
        })?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).map_err(|err| {
            ConvertError::Config(format!("Could not read configuration {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_config(&self, path: &Path) -> Result<(), ConvertError> {
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            ConvertError::Config(format!("Could not save configuration {err:}"))
        })?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        self.placement.validate()?;
        self.difficulty_buckets()?;
        if self.audio_timeout_secs == 0 {
            return Err(ConvertError::Config(
                "audio_timeout_secs must be positive".to_string(),
            ));
        }
        if self.cover_size == 0 {
            return Err(ConvertError::Config("cover_size must be positive".to_string()));
        }
        if self.jobs == Some(0) {
            return Err(ConvertError::Config("jobs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn difficulty_buckets(&self) -> Result<DifficultyBuckets, ConvertError> {
        DifficultyBuckets::new(self.difficulty_bounds)
    }

    pub const fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs)
    }

    /// Configured parallelism or the number of cores
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "placement": { "phrase_gap_beats": 4.0 }, "jobs": 3, "unknown": true }"#,
        )
        .unwrap();
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.placement.phrase_gap_beats, 4.0);
        assert_eq!(config.placement.resample_interval_beats, 0.25);
        assert_eq!(config.difficulty_bounds, [2.0, 4.0, 6.0, 8.0]);
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.jobs(), 3);
    }

    #[test]
    fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            cover_size: 256,
            difficulty_bounds: [1.5, 3.5, 5.5, 7.5],
            ..Config::default()
        };
        config.save_config(&path).unwrap();
        assert_eq!(Config::from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        for json in [
            r#"{ "difficulty_bounds": [8, 6, 4, 2] }"#,
            r#"{ "placement": { "resample_interval_beats": -1 } }"#,
            r#"{ "audio_timeout_secs": 0 }"#,
            r#"{ "jobs": 0 }"#,
            r#"{ "cover_size": "big" }"#,
            "not json",
        ] {
            std::fs::write(&path, json).unwrap();
            assert!(
                matches!(Config::from_path(&path), Err(ConvertError::Config(_))),
                "{json}"
            );
        }
        assert!(Config::from_path(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.jobs() >= 1);
        assert_eq!(config.audio_timeout(), Duration::from_secs(120));
    }
}
