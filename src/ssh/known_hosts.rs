//! Populating the known-hosts file from `ssh-keyscan`.

use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;
use tracing::{debug, info};

use crate::fs::{FsError, file_exists, overwrite_file, read_file};
use crate::process::{CommandRunner, CommandSpec, OutputMode, ProcessError};

/// Default key scanning executable.
pub const DEFAULT_SSH_KEYSCAN_BIN: &str = "ssh-keyscan";

/// Errors raised while updating the known-hosts file.
#[derive(Debug, Error)]
pub enum KnownHostsError {
    /// Raised when `ssh-keyscan` cannot be started.
    #[error("failed to run ssh-keyscan for {host}: {source}")]
    Spawn {
        /// Host being scanned.
        host: String,
        /// Underlying process error.
        #[source]
        source: ProcessError,
    },
    /// Raised when `ssh-keyscan` exits unsuccessfully.
    #[error("ssh-keyscan exited with status {status_text} for {host}: {stderr}")]
    Scan {
        /// Host being scanned.
        host: String,
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when the scan returned no key lines.
    #[error("ssh-keyscan returned no host keys for {host}")]
    NoKeys {
        /// Host being scanned.
        host: String,
    },
    /// Raised when the known-hosts file cannot be read or written.
    #[error("known hosts file update failed: {0}")]
    Fs(#[from] FsError),
}

/// Prefix of a host field hashed by `ssh-keyscan -H`.
const HASHED_HOST_PREFIX: &str = "|1|";

type HmacSha1 = Hmac<Sha1>;

/// Host field, key type, and base64 blob of a known-hosts line.
///
/// Comments, blank lines, and marker lines (`@cert-authority`, `@revoked`)
/// yield `None`.
fn parse_entry(line: &str) -> Option<(&str, &str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('@') {
        return None;
    }
    let mut fields = trimmed.split_whitespace();
    let hosts = fields.next()?;
    let key_type = fields.next()?;
    let blob = fields.next()?;
    Some((hosts, key_type, blob))
}

/// Whether the host field of an entry names `host`, hashed or plain.
fn hosts_field_matches(hosts: &str, host: &str) -> bool {
    let Some(hashed) = hosts.strip_prefix(HASHED_HOST_PREFIX) else {
        return hosts.split(',').any(|pattern| pattern == host);
    };
    let Some((salt, hash)) = hashed.split_once('|') else {
        return false;
    };
    let (Ok(salt_bytes), Ok(hash_bytes)) = (STANDARD.decode(salt), STANDARD.decode(hash)) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(&salt_bytes) else {
        return false;
    };
    mac.update(host.as_bytes());
    mac.verify_slice(&hash_bytes).is_ok()
}

/// Appends scanned lines for `host` whose key is not yet recorded for
/// `host` in `existing`. The same key recorded under another host does not
/// count.
///
/// Returns the merged file contents and the number of lines added.
#[must_use]
pub fn merge_known_hosts(existing: &str, scanned: &str, host: &str) -> (String, usize) {
    let mut seen: HashSet<(String, String)> = existing
        .lines()
        .filter_map(parse_entry)
        .filter(|(hosts, _, _)| hosts_field_matches(hosts, host))
        .map(|(_, key_type, blob)| (key_type.to_owned(), blob.to_owned()))
        .collect();

    let mut merged = existing.to_owned();
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    let mut added = 0;
    for line in scanned.lines() {
        let Some((_, key_type, blob)) = parse_entry(line) else {
            continue;
        };
        if seen.insert((key_type.to_owned(), blob.to_owned())) {
            merged.push_str(line.trim());
            merged.push('\n');
            added += 1;
        }
    }
    (merged, added)
}

/// Keeps the known-hosts file in step with freshly provisioned hosts.
#[derive(Clone, Debug)]
pub struct KnownHostsManager<R: CommandRunner> {
    path: Utf8PathBuf,
    keyscan_bin: String,
    runner: R,
}

impl<R: CommandRunner> KnownHostsManager<R> {
    /// Creates a manager for the known-hosts file at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, runner: R) -> Self {
        Self {
            path: path.into(),
            keyscan_bin: DEFAULT_SSH_KEYSCAN_BIN.to_owned(),
            runner,
        }
    }

    /// Overrides the key scanning executable.
    #[must_use]
    pub fn with_keyscan_bin(mut self, bin: impl Into<String>) -> Self {
        self.keyscan_bin = bin.into();
        self
    }

    /// Known-hosts file location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Scans `host` and merges its keys into the file.
    ///
    /// Returns the number of entries added.
    ///
    /// # Errors
    ///
    /// Returns [`KnownHostsError`] when the scan fails or the file cannot be
    /// updated.
    pub fn ensure_host(&self, host: &str) -> Result<usize, KnownHostsError> {
        let spec = CommandSpec::new(&self.keyscan_bin)
            .args(["-H", host])
            .mode(OutputMode::Silent);
        let output = self
            .runner
            .run(&spec)
            .map_err(|source| KnownHostsError::Spawn {
                host: host.to_owned(),
                source,
            })?;
        if !output.is_success() {
            return Err(KnownHostsError::Scan {
                host: host.to_owned(),
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }
        if output.stdout.lines().filter_map(parse_entry).next().is_none() {
            return Err(KnownHostsError::NoKeys {
                host: host.to_owned(),
            });
        }

        let existing = if file_exists(&self.path)? {
            read_file(&self.path)?
        } else {
            String::new()
        };
        let (merged, added) = merge_known_hosts(&existing, &output.stdout, host);
        if added == 0 {
            debug!(%host, path = %self.path, "known hosts already current");
            return Ok(0);
        }
        overwrite_file(&self.path, &merged)?;
        info!(%host, added, path = %self.path, "updated known hosts");
        Ok(added)
    }
}
