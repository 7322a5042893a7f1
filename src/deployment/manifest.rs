//! Deployment manifest loading.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deployment::outputs::DeploymentOutputs;
use crate::deployment::Deployment;
use crate::routing::{I18nConfig, RouteTable, RuleError, RuleSet};

/// On-disk description of one deployment, produced by the build.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManifest {
    pub build_id: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i18n: Option<I18nConfig>,
    #[serde(default)]
    pub routes: RuleSet,
    /// Extra known pathnames beyond those implied by `outputs`.
    #[serde(default)]
    pub pathnames: Vec<String>,
    #[serde(default)]
    pub outputs: DeploymentOutputs,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid route rules: {0}")]
    Rules(#[from] RuleError),

    #[error("buildId must not be empty")]
    EmptyBuildId,

    #[error("basePath `{0}` must be empty or start with `/` without a trailing `/`")]
    BasePath(String),

    #[error("i18n defaultLocale `{0}` is not one of the configured locales")]
    DefaultLocale(String),
}

impl DeploymentManifest {
    /// Check invariants and compile the rule set.
    pub fn compile(self) -> Result<Deployment, ManifestError> {
        if self.build_id.trim().is_empty() {
            return Err(ManifestError::EmptyBuildId);
        }
        if !self.base_path.is_empty()
            && (!self.base_path.starts_with('/') || self.base_path.ends_with('/'))
        {
            return Err(ManifestError::BasePath(self.base_path));
        }
        if let Some(i18n) = &self.i18n {
            if !i18n.has_default_locale() {
                return Err(ManifestError::DefaultLocale(i18n.default_locale.clone()));
            }
        }

        let routes = RouteTable::compile(&self.routes)?;

        let mut pathnames: HashSet<String> = self.pathnames.into_iter().collect();
        pathnames.extend(self.outputs.pathnames().map(str::to_string));

        Ok(Deployment {
            build_id: self.build_id,
            base_path: self.base_path,
            i18n: self.i18n,
            routes,
            pathnames,
            outputs: self.outputs,
        })
    }
}

/// Parse and compile a manifest from JSON text.
pub fn parse_manifest(content: &str) -> Result<Deployment, ManifestError> {
    let manifest: DeploymentManifest = serde_json::from_str(content)?;
    manifest.compile()
}

/// Load and compile a manifest from disk.
pub fn load_deployment(path: &Path) -> Result<Deployment, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&content)
}
