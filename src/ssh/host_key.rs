//! Host key trust policy.

use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use ssh2::{CheckResult, KnownHostFileKind, KnownHostKeyFormat, Session};
use thiserror::Error;
use tracing::{info, warn};

use crate::fs::{ensure_dir, file_exists};

/// How an unknown or changed host key is treated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HostKeyPolicy {
    /// Only keys already in the known-hosts file are accepted.
    #[default]
    Strict,
    /// Unknown hosts are recorded on first contact; changed keys fail.
    TrustOnFirstUse,
    /// Any key is accepted without checking.
    AcceptAny,
}

impl HostKeyPolicy {
    /// Name used in configuration and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::TrustOnFirstUse => "tofu",
            Self::AcceptAny => "accept-any",
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Raised when a policy name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown host key policy {0:?}; expected strict, tofu, or accept-any")]
pub struct ParseHostKeyPolicyError(String);

impl FromStr for HostKeyPolicy {
    type Err = ParseHostKeyPolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "tofu" | "trust-on-first-use" => Ok(Self::TrustOnFirstUse),
            "accept-any" | "insecure" => Ok(Self::AcceptAny),
            _ => Err(ParseHostKeyPolicyError(value.to_owned())),
        }
    }
}

/// Result of looking a presented key up in the known-hosts file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KnownHostStatus {
    /// The key matches a recorded entry.
    Match,
    /// The host has no recorded entry.
    NotFound,
    /// The host is recorded with a different key.
    Mismatch,
    /// The lookup itself failed.
    Failure,
}

impl From<CheckResult> for KnownHostStatus {
    fn from(result: CheckResult) -> Self {
        match result {
            CheckResult::Match => Self::Match,
            CheckResult::NotFound => Self::NotFound,
            CheckResult::Mismatch => Self::Mismatch,
            CheckResult::Failure => Self::Failure,
        }
    }
}

/// What to do with a presented host key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostKeyDecision {
    /// Continue without recording anything.
    Accept,
    /// Continue and append the key to the known-hosts file.
    Record,
    /// Abort the connection.
    Reject(KnownHostStatus),
}

/// Applies `policy` to a lookup result.
#[must_use]
pub const fn decide(policy: HostKeyPolicy, status: KnownHostStatus) -> HostKeyDecision {
    match (policy, status) {
        (HostKeyPolicy::AcceptAny, _) | (_, KnownHostStatus::Match) => HostKeyDecision::Accept,
        (HostKeyPolicy::TrustOnFirstUse, KnownHostStatus::NotFound) => HostKeyDecision::Record,
        (_, other) => HostKeyDecision::Reject(other),
    }
}

/// Errors raised while verifying a host key.
#[derive(Debug, Error)]
pub enum HostKeyError {
    /// Raised when the server presented no host key.
    #[error("{host} presented no host key")]
    Missing {
        /// Host being verified.
        host: String,
    },
    /// Raised when the known-hosts file cannot be loaded or written.
    #[error("known hosts file {path} could not be used: {source}")]
    KnownHostsFile {
        /// Known-hosts path.
        path: String,
        /// Underlying library error.
        #[source]
        source: ssh2::Error,
    },
    /// Raised when the known-hosts path cannot be inspected.
    #[error("known hosts file could not be inspected: {0}")]
    Fs(#[from] crate::fs::FsError),
    /// Raised when the host has no entry under the strict policy.
    #[error("host key for {host} is not in {path}; rerun once the keyscan succeeds or pass --host-key-policy tofu")]
    Unknown {
        /// Host being verified.
        host: String,
        /// Known-hosts path.
        path: String,
    },
    /// Raised when the host is recorded with a different key.
    #[error("host key for {host} does not match the entry in {path}")]
    Changed {
        /// Host being verified.
        host: String,
        /// Known-hosts path.
        path: String,
    },
    /// Raised when the lookup failed inside the library.
    #[error("host key lookup for {host} failed")]
    Lookup {
        /// Host being verified.
        host: String,
    },
}

/// Verifies the key `session` negotiated with `host:port`.
///
/// # Errors
///
/// Returns [`HostKeyError`] when the policy rejects the key or the
/// known-hosts file cannot be used.
pub fn verify(
    session: &Session,
    host: &str,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_file: &Utf8Path,
) -> Result<(), HostKeyError> {
    if policy == HostKeyPolicy::AcceptAny {
        warn!(%host, "accepting host key without verification");
        return Ok(());
    }

    let file_error = |source| HostKeyError::KnownHostsFile {
        path: known_hosts_file.to_string(),
        source,
    };
    let (key, key_type) = session.host_key().ok_or_else(|| HostKeyError::Missing {
        host: host.to_owned(),
    })?;
    let mut known_hosts = session.known_hosts().map_err(file_error)?;
    if file_exists(known_hosts_file)? {
        known_hosts
            .read_file(known_hosts_file.as_std_path(), KnownHostFileKind::OpenSSH)
            .map_err(file_error)?;
    }

    let status = KnownHostStatus::from(known_hosts.check_port(host, port, key));
    match decide(policy, status) {
        HostKeyDecision::Accept => Ok(()),
        HostKeyDecision::Record => {
            info!(%host, path = %known_hosts_file, "recording host key on first use");
            known_hosts
                .add(host, key, "", KnownHostKeyFormat::from(key_type))
                .map_err(file_error)?;
            if let Some(parent) = known_hosts_file.parent()
                && !parent.as_str().is_empty()
            {
                ensure_dir(parent)?;
            }
            known_hosts
                .write_file(known_hosts_file.as_std_path(), KnownHostFileKind::OpenSSH)
                .map_err(file_error)
        }
        HostKeyDecision::Reject(KnownHostStatus::Mismatch) => Err(HostKeyError::Changed {
            host: host.to_owned(),
            path: known_hosts_file.to_string(),
        }),
        HostKeyDecision::Reject(KnownHostStatus::Failure) => Err(HostKeyError::Lookup {
            host: host.to_owned(),
        }),
        HostKeyDecision::Reject(_) => Err(HostKeyError::Unknown {
            host: host.to_owned(),
            path: known_hosts_file.to_string(),
        }),
    }
}
