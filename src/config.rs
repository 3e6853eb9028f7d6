//! Node configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `DEFENDER_*` environment variables.
//!
//! | Key                | Env                          | Default             |
//! |--------------------|------------------------------|---------------------|
//! | `role`             | `DEFENDER_ROLE`              | `client`            |
//! | `address`          | `DEFENDER_ADDRESS`           | `127.0.0.1:24100`   |
//! | `receiver`         | `DEFENDER_RECEIVER`          | `client-receiver`   |
//! | `fps`              | `DEFENDER_FPS`               | `40`                |
//! | `minimum_fps`      | `DEFENDER_MINIMUM_FPS`       | `4`                 |
//! | `connect_timeout_ms` | `DEFENDER_CONNECT_TIMEOUT_MS` | `5000`           |
//! | `client_to_server` | `DEFENDER_CLIENT_TO_SERVER`  | requests            |
//! | `server_to_client` | `DEFENDER_SERVER_TO_CLIENT`  | game state          |
//!
//! List values in the environment are comma separated.

use crate::endpoint::Role;
use crate::protocol::{AllowList, CopyKind, NetDirection, OverlappingAllowList};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "DEFENDER";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] ::config::ConfigError),
    #[error("invalid address '{0}': {1}")]
    InvalidAddress(String, std::net::AddrParseError),
    #[error("unknown event kind '{0}' in allow-list")]
    UnknownEventKind(String),
    #[error(transparent)]
    Overlap(#[from] OverlappingAllowList),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub role: Role,
    pub address: String,
    /// Name the client announces for its event receiver.
    pub receiver: String,
    pub fps: u32,
    /// Tick deltas are clamped to `1 / minimum_fps`.
    pub minimum_fps: u32,
    /// How long a client waits for its connect to complete.
    pub connect_timeout_ms: u64,
    pub client_to_server: Vec<String>,
    pub server_to_client: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let defaults = AllowList::default();
        Self {
            role: Role::Client,
            address: "127.0.0.1:24100".into(),
            receiver: "client-receiver".into(),
            fps: 40,
            minimum_fps: 4,
            connect_timeout_ms: 5000,
            client_to_server: kind_names(&defaults, NetDirection::ClientToServer),
            server_to_client: kind_names(&defaults, NetDirection::ServerToClient),
        }
    }
}

fn kind_names(list: &AllowList, direction: NetDirection) -> Vec<String> {
    let mut kinds: Vec<CopyKind> = list.kinds(direction).iter().copied().collect();
    kinds.sort();
    kinds.into_iter().map(|k| k.name().to_string()).collect()
}

impl NodeConfig {
    /// Load defaults, then `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("client_to_server")
                .with_list_parse_key("server_to_client"),
        );
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(self.address.clone(), e))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn allow_list(&self) -> Result<AllowList, ConfigError> {
        let up = parse_kinds(&self.client_to_server)?;
        let down = parse_kinds(&self.server_to_client)?;
        Ok(AllowList::new(up, down)?)
    }
}

fn parse_kinds(names: &[String]) -> Result<Vec<CopyKind>, ConfigError> {
    names
        .iter()
        .map(|n| {
            let n = n.trim();
            CopyKind::parse(n).ok_or_else(|| ConfigError::UnknownEventKind(n.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
