use crate::build::BuildOptions;
use crate::error::ConfigError;
use crate::search::DEFAULT_MAX_FAILURES;
use crate::side::Side;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "qa-match.toml";

/// One repository side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideConfig {
    pub label: String,
    pub path: PathBuf,
    /// Working branch the search creates and moves around
    pub branch: String,
    /// Build profile used for this side only, on top of `[build].profile`
    #[serde(default)]
    pub profile: Option<String>,
}

impl SideConfig {
    fn default_for(side: Side) -> Self {
        let (label, path) = match side {
            Side::A => ("os", "."),
            Side::B => ("ee", "../ee"),
        };
        SideConfig {
            label: label.to_string(),
            path: PathBuf::from(path),
            branch: format!("qa-match-{}", label),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub program: String,
    #[serde(flatten)]
    pub options: BuildOptions,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig { program: "mvn".to_string(), options: BuildOptions::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_failures: usize,
    pub output_dir: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig { max_failures: DEFAULT_MAX_FAILURES, output_dir: PathBuf::from(".") }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub side_a: SideConfig,
    pub side_b: SideConfig,
    pub build: BuildConfig,
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            side_a: SideConfig::default_for(Side::A),
            side_b: SideConfig::default_for(Side::B),
            build: BuildConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load `path` if given, else the default file if it exists, else
    /// defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn side(&self, side: Side) -> &SideConfig {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }
}
