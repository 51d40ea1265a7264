use crate::pollctl::*;

use poll_engine::{ArchiveSettings, EngineConfig, Limits, UserId};
use serde::{Deserialize, Serialize};
use std::fs;

/// The configuration file of pollctl. Every field is optional and falls back to
/// the engine defaults.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "dataFile")]
    pub data_file: Option<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(rename = "maxOptions")]
    pub max_options: Option<usize>,
    #[serde(rename = "maxTitleLength")]
    pub max_title_length: Option<usize>,
    #[serde(rename = "defaultPageSize")]
    pub default_page_size: Option<usize>,
    #[serde(rename = "maxPageSize")]
    pub max_page_size: Option<usize>,
}

impl AppConfig {
    pub fn engine_config(&self) -> EngineConfig {
        let d = EngineConfig::DEFAULT;
        let max_page_size = self
            .max_page_size
            .unwrap_or(d.archive.max_page_size)
            .max(1);
        EngineConfig {
            admins: self.admins.iter().map(|a| UserId::from(a.as_str())).collect(),
            limits: Limits {
                max_options: self.max_options.unwrap_or(d.limits.max_options),
                max_title_length: self.max_title_length.unwrap_or(d.limits.max_title_length),
            },
            archive: ArchiveSettings {
                default_page_size: self
                    .default_page_size
                    .unwrap_or(d.archive.default_page_size)
                    .clamp(1, max_page_size),
                max_page_size,
            },
        }
    }
}

pub fn read_config(path: &str) -> CliResult<AppConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: AppConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    Ok(config)
}
