//! Local SSH keypair management.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::fs::{FsError, ensure_dir, file_exists, read_file};
use crate::process::{CommandRunner, CommandSpec, OutputMode, ProcessError};

/// Default key generation executable.
pub const DEFAULT_SSH_KEYGEN_BIN: &str = "ssh-keygen";

/// Errors raised while preparing or reading the local keypair.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Raised when the key files cannot be inspected or read.
    #[error("key file access failed: {0}")]
    Fs(#[from] FsError),
    /// Raised when `ssh-keygen` cannot be started.
    #[error("failed to run ssh-keygen for {path}: {source}")]
    Spawn {
        /// Private key being generated.
        path: Utf8PathBuf,
        /// Underlying process error.
        #[source]
        source: ProcessError,
    },
    /// Raised when `ssh-keygen` exits unsuccessfully.
    #[error("ssh-keygen exited with status {status_text} for {path}: {stderr}")]
    Generate {
        /// Private key being generated.
        path: Utf8PathBuf,
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when the public key file is empty.
    #[error("public key {path} is empty")]
    EmptyPublicKey {
        /// Public key path.
        path: Utf8PathBuf,
    },
}

/// Path of the public half for a private key path.
#[must_use]
pub fn public_key_path(private_key: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{private_key}.pub"))
}

/// Reads the private key and encodes it as standard base64.
///
/// # Errors
///
/// Returns [`KeyError::Fs`] when the key cannot be read.
pub fn encode_private_key(private_key: &Utf8Path) -> Result<String, KeyError> {
    let contents = read_file(private_key)?;
    Ok(STANDARD.encode(contents.as_bytes()))
}

/// Generates and reads the RSA keypair used for the bastion.
#[derive(Clone, Debug)]
pub struct KeyStore<R: CommandRunner> {
    private_key: Utf8PathBuf,
    keygen_bin: String,
    runner: R,
}

impl<R: CommandRunner> KeyStore<R> {
    /// Creates a store for the keypair at `private_key`.
    #[must_use]
    pub fn new(private_key: impl Into<Utf8PathBuf>, runner: R) -> Self {
        Self {
            private_key: private_key.into(),
            keygen_bin: DEFAULT_SSH_KEYGEN_BIN.to_owned(),
            runner,
        }
    }

    /// Overrides the key generation executable.
    #[must_use]
    pub fn with_keygen_bin(mut self, bin: impl Into<String>) -> Self {
        self.keygen_bin = bin.into();
        self
    }

    /// Private key location.
    #[must_use]
    pub fn private_key_path(&self) -> &Utf8Path {
        &self.private_key
    }

    /// Generates the keypair when the private key is absent.
    ///
    /// Returns `true` when a key was generated.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the existing key cannot be checked or
    /// generation fails.
    pub fn ensure_key(&self) -> Result<bool, KeyError> {
        if file_exists(&self.private_key)? {
            return Ok(false);
        }
        if let Some(parent) = self.private_key.parent()
            && !parent.as_str().is_empty()
        {
            ensure_dir(parent)?;
        }

        info!(path = %self.private_key, "generating SSH keypair");
        let spec = CommandSpec::new(&self.keygen_bin)
            .args([
                "-f",
                self.private_key.as_str(),
                "-t",
                "rsa",
                "-b",
                "4096",
                "-C",
                "",
                "-N",
                "",
            ])
            .mode(OutputMode::Silent);
        let output = self.runner.run(&spec).map_err(|source| KeyError::Spawn {
            path: self.private_key.clone(),
            source,
        })?;
        if !output.is_success() {
            return Err(KeyError::Generate {
                path: self.private_key.clone(),
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }
        Ok(true)
    }

    /// Reads the public key, trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the file is missing, unreadable, or empty.
    pub fn public_key(&self) -> Result<String, KeyError> {
        let path = public_key_path(&self.private_key);
        let key = read_file(&path)?.trim().to_owned();
        if key.is_empty() {
            return Err(KeyError::EmptyPublicKey { path });
        }
        Ok(key)
    }

    /// Base64 encoding of the private key file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Fs`] when the key cannot be read.
    pub fn base64_private_key(&self) -> Result<String, KeyError> {
        encode_private_key(&self.private_key)
    }
}
