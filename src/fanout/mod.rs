//! Segment-host fanout
//!
//! A process-wide pool of SSH sessions to the primary segment hosts. The
//! pool exists for the lifetime of one run: clients are created lazily the
//! first time a host is addressed and reused for every later command.
//! Session creation is serialized behind the pool mutex; command execution
//! opens a fresh channel per call and may proceed concurrently across hosts.
//!
//! Authentication is `~/.ssh/id_rsa` public-key auth as the database
//! administration user, matching how segment hosts are provisioned.

mod errors;
mod plugin;

pub use errors::{FanoutError, FanoutResult};
pub use plugin::PluginConfig;

use std::collections::HashMap;
use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ssh2::Session;
use tokio::process::Command;

const SSH_USER: &str = "gpadmin";

/// Pool of long-lived SSH sessions keyed by hostname.
pub struct SshPool {
    clients: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl Default for SshPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SshPool {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Eagerly create a session for every host, failing the run early if a
    /// host is unreachable.
    pub fn warm(&self, hosts: &[String]) -> FanoutResult<()> {
        for host in hosts {
            self.get_client(host)?;
        }
        Ok(())
    }

    fn get_client(&self, host: &str) -> FanoutResult<Arc<Mutex<Session>>> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| FanoutError::PoolPoisoned)?;

        if let Some(client) = clients.get(host) {
            return Ok(Arc::clone(client));
        }

        let session = create_session(host)?;
        let client = Arc::new(Mutex::new(session));
        clients.insert(host.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Run a shell command on `host` and return its trimmed stdout.
    ///
    /// A non-zero exit status is an error carrying the command's stderr.
    pub fn execute(&self, host: &str, command: &str) -> FanoutResult<String> {
        let client = self.get_client(host)?;
        let session = client.lock().map_err(|_| FanoutError::PoolPoisoned)?;

        let mut channel = session
            .channel_session()
            .map_err(|e| FanoutError::Session(host.to_string(), e.to_string()))?;
        channel
            .exec(command)
            .map_err(|e| FanoutError::Exec(host.to_string(), command.to_string(), e.to_string()))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| FanoutError::Exec(host.to_string(), command.to_string(), e.to_string()))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| FanoutError::Exec(host.to_string(), command.to_string(), e.to_string()))?;

        channel
            .wait_close()
            .map_err(|e| FanoutError::Exec(host.to_string(), command.to_string(), e.to_string()))?;

        let status = channel
            .exit_status()
            .map_err(|e| FanoutError::Exec(host.to_string(), command.to_string(), e.to_string()))?;
        if status != 0 {
            return Err(FanoutError::CommandFailed(
                host.to_string(),
                command.to_string(),
                status,
                stderr.trim_end().to_string(),
            ));
        }

        Ok(stdout.trim_end_matches('\n').to_string())
    }
}

fn create_session(host: &str) -> FanoutResult<Session> {
    let key_path = private_key_path()?;

    let tcp = TcpStream::connect((host, 22))
        .map_err(|e| FanoutError::Connect(host.to_string(), e.to_string()))?;

    let mut session =
        Session::new().map_err(|e| FanoutError::Session(host.to_string(), e.to_string()))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| FanoutError::Session(host.to_string(), e.to_string()))?;
    session
        .userauth_pubkey_file(SSH_USER, None, &key_path, None)
        .map_err(|e| FanoutError::Auth(host.to_string(), e.to_string()))?;

    Ok(session)
}

fn private_key_path() -> FanoutResult<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| FanoutError::EnvMissing("HOME"))?;
    Ok(Path::new(&home).join(".ssh").join("id_rsa"))
}

/// Copy a local file to the same path on every host via `scp`.
pub async fn distribute_file(local: &Path, hosts: &[String]) -> FanoutResult<()> {
    for host in hosts {
        let target = format!("{}:{}", host, local.display());
        let output = Command::new("scp")
            .arg(local)
            .arg(&target)
            .output()
            .await
            .map_err(|e| FanoutError::Scp(host.to_string(), e.to_string()))?;

        if !output.status.success() {
            return Err(FanoutError::Scp(
                host.to_string(),
                String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            ));
        }
    }
    Ok(())
}
