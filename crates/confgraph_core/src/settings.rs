//! Engine settings loaded from a TOML file.
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::service::PublishOptions;
use crate::sync::GitIdentity;
use crate::tree::importer::DEFAULT_ASSETS_DIR;
use crate::tree::MirrorLayout;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum SettingsError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "cannot read settings `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid settings `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// SQLite file of the graph store.
    pub database_path: PathBuf,
    /// Root of the filesystem object store.
    pub object_store_dir: PathBuf,
    pub logging: LoggingSettings,
    pub mirror: MirrorSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("confgraph.db"),
            object_store_dir: PathBuf::from("objects"),
            logging: LoggingSettings::default(),
            mirror: MirrorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Absolute log directory; logs go to stderr when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub flow_dir: String,
    pub root_document: String,
    pub assets_dir: String,
    pub branch: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub commit_message: Option<String>,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        let identity = GitIdentity::default();
        Self {
            flow_dir: "flow".to_string(),
            root_document: "Flow.json".to_string(),
            assets_dir: DEFAULT_ASSETS_DIR.to_string(),
            branch: identity.branch,
            author_name: identity.author_name,
            author_email: identity.author_email,
            commit_message: None,
            scratch_dir: None,
        }
    }
}

impl MirrorSettings {
    pub fn layout(&self) -> MirrorLayout {
        MirrorLayout {
            flow_dir: self.flow_dir.clone(),
            root_document: self.root_document.clone(),
            assets_dir: self.assets_dir.clone(),
        }
    }

    pub fn identity(&self) -> GitIdentity {
        GitIdentity {
            branch: self.branch.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
        }
    }

    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            layout: self.layout(),
            commit_message: self.commit_message.clone(),
            scratch_root: self.scratch_dir.clone(),
        }
    }
}

impl EngineSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolves relative paths against `base`.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        if self.database_path.is_relative() {
            self.database_path = base.join(&self.database_path);
        }
        if self.object_store_dir.is_relative() {
            self.object_store_dir = base.join(&self.object_store_dir);
        }
        self
    }
}
