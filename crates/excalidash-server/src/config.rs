use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use excalidash_core::storage::{FileStorage, StorageResult};

/// Room coordinator and drawing store for ExcaliDash collaboration
#[derive(Parser, Debug)]
#[command(name = "excalidash-server")]
#[command(version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "EXCALIDASH_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "EXCALIDASH_PORT", default_value_t = 3030)]
    pub port: u16,

    /// Directory holding drawing files (defaults to the platform data dir)
    #[arg(long, env = "EXCALIDASH_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn open_storage(&self) -> StorageResult<FileStorage> {
        match &self.data_dir {
            Some(dir) => FileStorage::new(dir.clone()),
            None => FileStorage::default_location(),
        }
    }
}
