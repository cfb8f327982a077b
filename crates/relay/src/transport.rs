use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Directory holding IPC socket files.
const IPC_DIR: &str = "/tmp/collectify";

/// Where a ZeroMQ socket binds or connects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket named `/tmp/collectify/<name>.sock`.
    Ipc(String),

    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse `ipc:///tmp/collectify/<name>.sock` or `tcp://host:port`.
    pub fn parse(endpoint: &str) -> Result<Self, RelayError> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            let name = Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| RelayError::Transport(format!("bad ipc endpoint: {endpoint}")))?;
            Ok(Transport::ipc(name))
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| RelayError::Transport(format!("missing port: {endpoint}")))?;
            let port = port
                .parse()
                .map_err(|_| RelayError::Transport(format!("bad port: {endpoint}")))?;
            Ok(Transport::tcp(host, port))
        } else {
            Err(RelayError::Transport(format!(
                "unsupported endpoint '{endpoint}', expected ipc:// or tcp://"
            )))
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc://{IPC_DIR}/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// ZeroMQ needs the socket directory to exist before an IPC bind.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            std::fs::create_dir_all(IPC_DIR)?;
        }
        Ok(())
    }

    /// Remove a `.sock` file left over from a previous run.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        if let Self::Ipc(name) = self {
            let path = format!("{IPC_DIR}/{name}.sock");
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path, "removed stale IPC socket"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl FromStr for Transport {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transport::parse(s)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}
