//! SSH keys, authentication, host trust, and interactive sessions.

pub mod auth;
pub mod config;
pub mod host_key;
pub mod keys;
pub mod known_hosts;
pub mod session;

pub use auth::{
    AGENT_SOCKET_ENV, AgentStrategy, AttemptError, AuthError, AuthMethod, AuthResolver,
    AuthStrategy, KeyFileStrategy, StrategyFailure,
};
pub use config::{BASTION_ALIAS, render_ssh_config};
pub use host_key::{HostKeyError, HostKeyPolicy, ParseHostKeyPolicyError};
pub use keys::{DEFAULT_SSH_KEYGEN_BIN, KeyError, KeyStore, encode_private_key, public_key_path};
pub use known_hosts::{
    DEFAULT_SSH_KEYSCAN_BIN, KnownHostsError, KnownHostsManager, merge_known_hosts,
};
pub use session::{
    CONNECT_TIMEOUT, InteractiveShell, SESSION_KEY_ENV, SSH_PORT, SSH_USER, SessionConfig,
    SessionError, SessionStage, Ssh2Shell, run_interactive,
};
