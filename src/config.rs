use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const APP_DIR: &str = ".scb";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "commands.db";

pub const DB_PATH_ENV: &str = "SHELL_CMD_BOOK_DB";
pub const DEBUG_ENV: &str = "DEBUG";
pub const HISTFILE_ENV: &str = "HISTFILE";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub import: ImportConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; empty means `~/.scb/commands.db`.
    pub db_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// History file; empty means `$HISTFILE`, then `~/.bash_history`.
    pub history_file: String,
    /// Regexes; matching commands are not imported.
    pub ignore_patterns: Vec<String>,
    /// Run shellcheck on imported commands when it is installed.
    pub lint: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            history_file: String::new(),
            ignore_patterns: Vec::new(),
            lint: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub language: String,
    // Width of one-line command summaries in prompts
    pub summary_length: usize,
    // Whether to use terminal alternate screen in the browser
    pub alt_screen: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            summary_length: 50,
            alt_screen: false,
        }
    }
}

impl Config {
    /// Load `~/.scb/config.toml`, writing the defaults there on first run.
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn data_dir() -> Result<PathBuf> {
        dirs::home_dir().map(|home| home.join(APP_DIR)).ok_or(Error::NoHomeDir)
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("logs"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join(CONFIG_FILE))
    }

    /// `$SHELL_CMD_BOOK_DB`, then `storage.db_path`, then the data dir.
    pub fn db_path(&self) -> Result<PathBuf> {
        self.db_path_with(env::var_os(DB_PATH_ENV).map(PathBuf::from))
    }

    fn db_path_with(&self, from_env: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(path);
        }
        if !self.storage.db_path.is_empty() {
            return Ok(expand_home(&self.storage.db_path));
        }
        Ok(Self::data_dir()?.join(DB_FILE))
    }

    /// History file to import: `explicit`, then `import.history_file`,
    /// then `$HISTFILE`. `None` leaves the choice to the scanner.
    pub fn history_path(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        self.history_path_with(explicit, env::var_os(HISTFILE_ENV).map(PathBuf::from))
    }

    fn history_path_with(&self, explicit: Option<&Path>, histfile: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if !self.import.history_file.is_empty() {
            return Some(expand_home(&self.import.history_file));
        }
        histfile.filter(|p| !p.as_os_str().is_empty())
    }

    pub fn ignore_patterns(&self) -> Result<Vec<Regex>> {
        self.import
            .ignore_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Config(format!("ignore pattern {:?}: {}", p, e))))
            .collect()
    }

    pub fn get_effective_language(&self) -> String {
        if self.display.language == "auto" {
            // Try to get system language
            env::var("LANG")
                .unwrap_or_else(|_| "en_US".to_string())
                .split('.')
                .next()
                .unwrap_or("en")
                .to_string()
        } else {
            self.display.language.clone()
        }
    }
}

/// Any non-empty `DEBUG` turns on debug logging.
pub fn debug_enabled() -> bool {
    env::var_os(DEBUG_ENV).is_some_and(|v| !v.is_empty())
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("[display]\nlanguage = \"zh\"\n").unwrap();
        assert_eq!(config.display.language, "zh");
        assert_eq!(config.display.summary_length, 50);
        assert!(config.import.lint);
        assert!(config.storage.db_path.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.import.ignore_patterns = vec!["^ls$".into(), "^cd ".into()];
        config.display.alt_screen = true;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[display\nlanguage=").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn db_path_precedence() {
        let mut config = Config::default();
        config.storage.db_path = "/var/lib/scb/book.db".into();
        assert_eq!(
            config.db_path_with(Some(PathBuf::from("/tmp/env.db"))).unwrap(),
            PathBuf::from("/tmp/env.db")
        );
        assert_eq!(
            config.db_path_with(Some(PathBuf::new())).unwrap(),
            PathBuf::from("/var/lib/scb/book.db")
        );
        assert_eq!(config.db_path_with(None).unwrap(), PathBuf::from("/var/lib/scb/book.db"));
    }

    #[test]
    fn history_path_precedence() {
        let mut config = Config::default();
        let histfile = Some(PathBuf::from("/home/u/.hist"));
        assert_eq!(config.history_path_with(None, histfile.clone()), histfile);
        assert_eq!(config.history_path_with(None, None), None);

        config.import.history_file = "/data/history".into();
        assert_eq!(
            config.history_path_with(None, histfile.clone()),
            Some(PathBuf::from("/data/history"))
        );
        assert_eq!(
            config.history_path_with(Some(Path::new("/x")), histfile),
            Some(PathBuf::from("/x"))
        );
    }

    #[test]
    fn ignore_patterns_compile_or_fail() {
        let mut config = Config::default();
        config.import.ignore_patterns = vec!["^ls( |$)".into()];
        let patterns = config.ignore_patterns().unwrap();
        assert!(patterns[0].is_match("ls -la"));
        assert!(!patterns[0].is_match("lsblk"));

        config.import.ignore_patterns.push("(".into());
        assert!(matches!(config.ignore_patterns(), Err(Error::Config(_))));
    }

    #[test]
    fn explicit_language_wins() {
        let mut config = Config::default();
        config.display.language = "zh_CN".into();
        assert_eq!(config.get_effective_language(), "zh_CN");
    }
}
