pub mod config;
pub mod dates;
pub mod generate;
pub mod git;
pub mod messages;
pub mod mutate;
pub mod scan;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "Backfill".to_string(),
            email: "backfill@localhost".to_string(),
        }
    }
}

pub struct Backfill {
    pub repo_path: std::path::PathBuf,
    pub config: Config,
}

impl Backfill {
    pub fn new<P: AsRef<Path>>(repo_path: P, config: Config) -> Result<Self> {
        let repo_path = repo_path.as_ref().to_path_buf();

        if !repo_path.join(".git").exists() {
            anyhow::bail!("Not a git repository: {}", repo_path.display());
        }

        Ok(Self { repo_path, config })
    }
}
