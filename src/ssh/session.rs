//! Interactive shell sessions over SSH.
//!
//! A session dials the host with a bounded connect timeout, verifies the
//! host key, authenticates, then requests a fixed-size `xterm` PTY and
//! starts a login shell. Local standard streams are pumped through the
//! channel until the remote side closes it.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use ssh2::{Channel, PtyModeOpcode, PtyModes, Session};
use thiserror::Error;
use tracing::{debug, info};

use super::auth::AuthMethod;
use super::host_key::{self, HostKeyError, HostKeyPolicy};

/// SSH port on every provisioned host.
pub const SSH_PORT: u16 = 22;

/// Login user on every provisioned host.
pub const SSH_USER: &str = "ubuntu";

/// Session variable carrying the base64-encoded private key.
pub const SESSION_KEY_ENV: &str = "BASE64_SSH_KEY";

/// Upper bound on TCP connect, handshake, and authentication.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const TERMINAL_TYPE: &str = "xterm";
const TERMINAL_COLUMNS: u32 = 80;
const TERMINAL_ROWS: u32 = 40;
const TERMINAL_BAUD: u32 = 14_400;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Connection parameters for one interactive session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionConfig {
    /// Host to dial.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Resolved credential.
    pub auth: AuthMethod,
    /// Host key acceptance policy.
    pub host_key_policy: HostKeyPolicy,
    /// Known-hosts file consulted by the policy.
    pub known_hosts_file: Utf8PathBuf,
    /// Bound on connect, handshake, and authentication.
    pub connect_timeout: Duration,
    /// Base64 private key exported as [`SESSION_KEY_ENV`], if any.
    pub forwarded_key: Option<String>,
}

impl SessionConfig {
    /// Creates a configuration with the fixed port, user, and timeout.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        auth: AuthMethod,
        known_hosts_file: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port: SSH_PORT,
            user: SSH_USER.to_owned(),
            auth,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_file: known_hosts_file.into(),
            connect_timeout: CONNECT_TIMEOUT,
            forwarded_key: None,
        }
    }

    /// Selects the host key policy.
    #[must_use]
    pub const fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Sets the key exported into the remote environment.
    #[must_use]
    pub fn with_forwarded_key(mut self, encoded: impl Into<String>) -> Self {
        self.forwarded_key = Some(encoded.into());
        self
    }

    /// Overrides the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` as dialled.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Protocol step during which a library call failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionStage {
    /// Creating the session object.
    Setup,
    /// Key exchange.
    Handshake,
    /// User authentication.
    Authenticate,
    /// Opening the session channel.
    OpenChannel,
    /// Requesting the pseudo-terminal.
    RequestPty,
    /// Exporting the session variable.
    SetEnv,
    /// Starting the login shell.
    StartShell,
    /// Waiting for the channel to close.
    Close,
}

impl SessionStage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "session setup",
            Self::Handshake => "handshake",
            Self::Authenticate => "authentication",
            Self::OpenChannel => "channel open",
            Self::RequestPty => "PTY request",
            Self::SetEnv => "environment export",
            Self::StartShell => "shell start",
            Self::Close => "channel close",
        }
    }
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors raised while running an interactive session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Raised when the host name cannot be resolved.
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        /// Address being resolved.
        address: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// Raised when resolution yields no addresses.
    #[error("{address} did not resolve to any socket address")]
    NoAddress {
        /// Address being resolved.
        address: String,
    },
    /// Raised when the TCP connection fails or times out.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address dialled.
        address: String,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// Raised when an SSH protocol step fails.
    #[error("SSH {stage} failed: {source}")]
    Protocol {
        /// Step that failed.
        stage: SessionStage,
        /// Library error.
        #[source]
        source: ssh2::Error,
    },
    /// Raised when the host key is rejected.
    #[error("host key verification failed: {0}")]
    HostKey(#[from] HostKeyError),
    /// Raised when the server does not accept the credential.
    #[error("server rejected authentication as {user}")]
    NotAuthenticated {
        /// Login user.
        user: String,
    },
    /// Raised when local stream forwarding fails.
    #[error("interactive I/O failed: {0}")]
    Io(#[source] io::Error),
}

impl SessionError {
    /// Step at which a protocol failure happened, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<SessionStage> {
        match self {
            Self::Protocol { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Opens an interactive shell and blocks until it ends.
pub trait InteractiveShell {
    /// Runs the session described by `config` and returns the remote exit
    /// status.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] naming the step that failed.
    fn run(&self, config: &SessionConfig) -> Result<i32, SessionError>;
}

impl<S: InteractiveShell + ?Sized> InteractiveShell for &S {
    fn run(&self, config: &SessionConfig) -> Result<i32, SessionError> {
        (**self).run(config)
    }
}

/// [`InteractiveShell`] backed by `libssh2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ssh2Shell;

impl InteractiveShell for Ssh2Shell {
    fn run(&self, config: &SessionConfig) -> Result<i32, SessionError> {
        run_interactive(config)
    }
}

fn protocol(stage: SessionStage) -> impl Fn(ssh2::Error) -> SessionError {
    move |source| SessionError::Protocol { stage, source }
}

fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Runs an interactive shell on `config.host`, attached to this process's
/// standard streams.
///
/// # Errors
///
/// Returns [`SessionError`] naming the step that failed.
pub fn run_interactive(config: &SessionConfig) -> Result<i32, SessionError> {
    let tcp = connect(config)?;
    let mut session = Session::new().map_err(protocol(SessionStage::Setup))?;
    session.set_timeout(timeout_millis(config.connect_timeout));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(protocol(SessionStage::Handshake))?;
    host_key::verify(
        &session,
        &config.host,
        config.port,
        config.host_key_policy,
        &config.known_hosts_file,
    )?;
    authenticate(&session, config)?;
    session.set_timeout(0);

    let mut channel = session
        .channel_session()
        .map_err(protocol(SessionStage::OpenChannel))?;
    channel
        .request_pty(
            TERMINAL_TYPE,
            Some(pty_modes()),
            Some((TERMINAL_COLUMNS, TERMINAL_ROWS, 0, 0)),
        )
        .map_err(protocol(SessionStage::RequestPty))?;
    if let Some(key) = &config.forwarded_key {
        channel
            .setenv(SESSION_KEY_ENV, key)
            .map_err(protocol(SessionStage::SetEnv))?;
    }
    channel
        .shell()
        .map_err(protocol(SessionStage::StartShell))?;
    info!(host = %config.host, user = %config.user, "interactive session started");

    pump(&session, &mut channel)?;

    channel
        .wait_close()
        .map_err(protocol(SessionStage::Close))?;
    let status = channel
        .exit_status()
        .map_err(protocol(SessionStage::Close))?;
    debug!(status, "interactive session ended");
    Ok(status)
}

fn connect(config: &SessionConfig) -> Result<TcpStream, SessionError> {
    let address = config.address();
    let socket = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|source| SessionError::Resolve {
            address: address.clone(),
            source,
        })?
        .next()
        .ok_or_else(|| SessionError::NoAddress {
            address: address.clone(),
        })?;
    debug!(%address, timeout = ?config.connect_timeout, "dialling");
    TcpStream::connect_timeout(&socket, config.connect_timeout)
        .map_err(|source| SessionError::Connect { address, source })
}

fn authenticate(session: &Session, config: &SessionConfig) -> Result<(), SessionError> {
    let attempt = match &config.auth {
        AuthMethod::Agent { .. } => session.userauth_agent(&config.user),
        AuthMethod::KeyFile { path } => {
            session.userauth_pubkey_file(&config.user, None, path.as_std_path(), None)
        }
    };
    attempt.map_err(protocol(SessionStage::Authenticate))?;

    if !session.authenticated() {
        return Err(SessionError::NotAuthenticated {
            user: config.user.clone(),
        });
    }
    Ok(())
}

fn pty_modes() -> PtyModes {
    let mut modes = PtyModes::new();
    modes.set_boolean(PtyModeOpcode::ECHO, false);
    modes.set_u32(PtyModeOpcode::TTY_OP_ISPEED, TERMINAL_BAUD);
    modes.set_u32(PtyModeOpcode::TTY_OP_OSPEED, TERMINAL_BAUD);
    modes
}

fn spawn_stdin_reader() -> io::Result<Receiver<Vec<u8>>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(String::from("ssh-stdin"))
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buffer = [0_u8; 1024];
            loop {
                let read = match stdin.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => read,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                };
                let chunk = buffer.get(..read).unwrap_or_default().to_vec();
                if sender.send(chunk).is_err() {
                    break;
                }
            }
        })?;
    Ok(receiver)
}

/// Copies whatever `source` has ready into `sink`. Returns whether anything
/// was copied.
fn copy_available(
    source: &mut impl Read,
    sink: &mut impl Write,
    buffer: &mut [u8],
) -> io::Result<bool> {
    match source.read(buffer) {
        Ok(0) => Ok(false),
        Ok(read) => {
            sink.write_all(buffer.get(..read).unwrap_or_default())?;
            sink.flush()?;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(err),
    }
}

/// Copies from `source` until it has nothing ready.
fn drain(source: &mut impl Read, sink: &mut impl Write, buffer: &mut [u8]) -> io::Result<()> {
    while copy_available(source, sink, buffer)? {}
    Ok(())
}

fn pump(session: &Session, channel: &mut Channel) -> Result<(), SessionError> {
    let input = spawn_stdin_reader().map_err(SessionError::Io)?;
    session.set_blocking(false);
    let result = pump_loop(channel, &input);
    session.set_blocking(true);
    result.map_err(SessionError::Io)
}

fn pump_loop(channel: &mut Channel, input: &Receiver<Vec<u8>>) -> io::Result<()> {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let mut buffer = [0_u8; 8192];
    let mut pending: Vec<u8> = Vec::new();
    let mut stdin_open = true;
    let mut eof_sent = false;

    loop {
        let mut progressed = false;

        if pending.is_empty() && stdin_open {
            match input.try_recv() {
                Ok(chunk) => {
                    pending = chunk;
                    progressed = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => stdin_open = false,
            }
        }

        if !pending.is_empty() {
            match channel.write(&pending) {
                Ok(written) => {
                    pending.drain(..written.min(pending.len()));
                    progressed = true;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(err),
            }
        } else if !stdin_open && !eof_sent {
            match channel.send_eof().map_err(io::Error::from) {
                Ok(()) => eof_sent = true,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(err),
            }
        }

        progressed |= copy_available(channel, &mut stdout, &mut buffer)?;
        progressed |= copy_available(&mut channel.stderr(), &mut stderr, &mut buffer)?;

        if channel.eof() {
            drain(channel, &mut stdout, &mut buffer)?;
            return drain(&mut channel.stderr(), &mut stderr, &mut buffer);
        }
        if !progressed {
            thread::sleep(POLL_INTERVAL);
        }
    }
}
