//! Scenario manifest loading.
//!
//! The manifest lives at `<scenarios_dir>/scenarios.yaml`:
//!
//! ```yaml
//! scenarios:
//!   - id: container-ambush
//!     name: Container Ambush
//!     path: container-ambush
//! ```
//!
//! Relative `path` values are resolved against the scenarios directory.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

use crate::fs::{FsError, read_file};

/// Manifest file name inside the scenarios directory.
pub const MANIFEST_FILE: &str = "scenarios.yaml";

/// Errors raised while loading the manifest.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Raised when the manifest cannot be read.
    #[error("failed to read scenario manifest: {0}")]
    Read(#[from] FsError),
    /// Raised when the manifest is not valid YAML of the expected shape.
    #[error("failed to parse scenario manifest {path}: {source}")]
    Parse {
        /// Manifest path.
        path: Utf8PathBuf,
        /// YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// One runnable scenario.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Scenario {
    /// Identifier used on the command line.
    pub id: String,
    /// Human readable title.
    #[serde(default)]
    pub name: String,
    /// Scenario directory handed to the perturb script.
    pub path: String,
}

/// Lookup of scenarios by identifier.
pub trait ScenarioCatalogue {
    /// Returns `true` when `id` names a scenario.
    fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Returns the scenario named `id`.
    fn find(&self, id: &str) -> Option<&Scenario>;
}

/// Scenarios declared in `scenarios.yaml`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct ScenarioManifest {
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

impl ScenarioManifest {
    /// Loads `scenarios.yaml` from `dir`, resolving relative scenario paths
    /// against it.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] when the manifest is missing or malformed.
    pub fn load(dir: &Utf8Path) -> Result<Self, ScenarioError> {
        let path = dir.join(MANIFEST_FILE);
        let contents = read_file(&path)?;
        let mut manifest: Self = serde_yaml::from_str(&contents)
            .map_err(|source| ScenarioError::Parse { path, source })?;
        for scenario in &mut manifest.scenarios {
            if Utf8Path::new(&scenario.path).is_relative() {
                scenario.path = dir.join(&scenario.path).into_string();
            }
        }
        Ok(manifest)
    }

    /// Every scenario in declaration order.
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }
}

impl FromIterator<Scenario> for ScenarioManifest {
    fn from_iter<T: IntoIterator<Item = Scenario>>(iter: T) -> Self {
        Self {
            scenarios: iter.into_iter().collect(),
        }
    }
}

impl ScenarioCatalogue for ScenarioManifest {
    fn find(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|scenario| scenario.id == id)
    }
}
