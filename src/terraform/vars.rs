//! The `bastion.tfVars` variable file handed to `terraform plan`.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::fs::{FsError, ensure_file};

/// Variable file location relative to the infrastructure directory.
pub const VARS_FILE: &str = "settings/bastion.tfVars";

/// Input variables for the bastion and cluster Terraform module.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TfVars {
    /// SSH public key installed on the bastion.
    pub public_key: String,
    /// CIDR allowed through the bastion firewall.
    pub access_cidr: String,
    /// Tag of the attack container image, if pinned.
    pub attack_container_tag: Option<String>,
    /// Remote state bucket, if state is kept remotely.
    pub state_bucket_name: Option<String>,
}

impl TfVars {
    /// Creates the two mandatory variables.
    #[must_use]
    pub fn new(public_key: impl Into<String>, access_cidr: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            access_cidr: access_cidr.into(),
            ..Self::default()
        }
    }

    /// Sets the attack container tag.
    #[must_use]
    pub fn with_attack_container_tag(mut self, tag: Option<String>) -> Self {
        self.attack_container_tag = tag;
        self
    }

    /// Sets the state bucket name.
    #[must_use]
    pub fn with_state_bucket_name(mut self, bucket: Option<String>) -> Self {
        self.state_bucket_name = bucket;
        self
    }

    /// Renders the file body, one `key = "value"` line per variable.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = vec![
            ("access_key", self.public_key.as_str()),
            ("access_cidr", self.access_cidr.as_str()),
        ];
        if let Some(tag) = &self.attack_container_tag {
            lines.push(("attack_container_tag", tag));
        }
        if let Some(bucket) = &self.state_bucket_name {
            lines.push(("state_bucket_name", bucket));
        }

        lines
            .into_iter()
            .map(|(key, value)| format!("{key} = \"{value}\"\n"))
            .collect()
    }
}

/// Writes the variable file under `tf_dir` unless one already exists.
///
/// An existing file is authoritative and is never compared or merged.
/// Returns `true` when this call wrote the file.
///
/// # Errors
///
/// Returns [`FsError`] when the settings directory or file cannot be
/// written.
pub fn ensure_vars_file(tf_dir: &Utf8Path, vars: &TfVars) -> Result<bool, FsError> {
    let path: Utf8PathBuf = tf_dir.join(VARS_FILE);
    let written = ensure_file(&path, &vars.render())?;
    if written {
        debug!(%path, "wrote terraform variables");
    } else {
        debug!(%path, "terraform variables already present; leaving untouched");
    }
    Ok(written)
}
