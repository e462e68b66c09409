//! Host checks run before a comparison
//!
//! Service ports that already answer usually mean a container from an
//! earlier run is still up. Reports and copied audio need some free disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use sysinfo::Disks;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::config::ServiceDefinition;

pub const RECOMMENDED_FREE_GB: f64 = 2.0;
pub const MINIMUM_FREE_GB: f64 = 1.0;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCheck {
    pub service_id: String,
    pub host: String,
    pub port: u16,
    pub in_use: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceStatus {
    Plenty,
    Low,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskCheck {
    pub path: PathBuf,
    /// `None` when no mounted disk contains the path
    pub available_bytes: Option<u64>,
}

impl DiskCheck {
    pub fn available_gb(&self) -> Option<f64> {
        self.available_bytes.map(|b| b as f64 / BYTES_PER_GB)
    }

    pub fn status(&self) -> Option<SpaceStatus> {
        self.available_gb().map(space_status)
    }
}

pub fn space_status(free_gb: f64) -> SpaceStatus {
    if free_gb >= RECOMMENDED_FREE_GB {
        SpaceStatus::Plenty
    } else if free_gb >= MINIMUM_FREE_GB {
        SpaceStatus::Low
    } else {
        SpaceStatus::Insufficient
    }
}

/// Host and port a service listens on, from its base URL
pub fn service_address(base_url: &str) -> Option<(String, u16)> {
    let url = Url::parse(base_url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

/// Whether something accepts TCP connections at `host:port`
pub async fn port_in_use(host: &str, port: u16) -> bool {
    match time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(host, port, "Port is free: {}", e);
            false
        }
        Err(_) => false,
    }
}

/// Check the port of every service whose base URL parses
pub async fn check_ports(services: &[ServiceDefinition]) -> Vec<PortCheck> {
    let mut checks = Vec::with_capacity(services.len());
    for service in services {
        let Some((host, port)) = service_address(&service.base_url) else {
            debug!(service = %service.id, url = %service.base_url, "Base URL has no usable address");
            continue;
        };
        let in_use = port_in_use(&host, port).await;
        checks.push(PortCheck {
            service_id: service.id.clone(),
            host,
            port,
            in_use,
        });
    }
    checks
}

/// Free space on the disk holding `path`
pub fn check_disk_space(path: &Path) -> DiskCheck {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let available_bytes = containing_mount(
        &resolved,
        disks
            .list()
            .iter()
            .map(|disk| (disk.mount_point(), disk.available_space())),
    );

    DiskCheck {
        path: resolved,
        available_bytes,
    }
}

/// Value of the deepest mount point that contains `path`
fn containing_mount<'a>(path: &Path, mounts: impl Iterator<Item = (&'a Path, u64)>) -> Option<u64> {
    mounts
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| available)
}
