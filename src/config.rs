use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::world::direction::Direction;
use crate::world::room::{NeighborAddr, RoomState};

#[derive(Debug)]
pub struct RoomConfig {
    pub port: u16,
    pub bind_addr: String,
    pub log_root: PathBuf,
    pub idle_timeout: Option<Duration>,
    name: String,
    description: String,
    items: Vec<String>,
    exits: Vec<(Direction, NeighborAddr)>,
}

#[derive(Debug, Deserialize)]
struct RoomFile {
    port: u16,
    name: String,
    description: String,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    exits: BTreeMap<String, String>,
    #[serde(default)]
    idle_timeout_secs: Option<u64>,
}

impl RoomConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: roomd <room-file.yaml> [bind_addr]".to_string());
        }

        let path = Path::new(&args[1]);
        let text = std::fs::read_to_string(path)
            .map_err(|err| format!("room file {} read failed: {}", path.display(), err))?;
        let file: RoomFile = serde_yaml::from_str(&text)
            .map_err(|err| format!("room file {} parse failed: {}", path.display(), err))?;

        let bind_addr = if args.len() > 2 {
            args[2].clone()
        } else {
            std::env::var("ROOMD_BIND_ADDR")
                .ok()
                .and_then(|value| {
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .unwrap_or_else(|| format!("0.0.0.0:{}", file.port))
        };

        let mut exits = Vec::new();
        for (direction, url) in &file.exits {
            let parsed = Direction::parse(direction).ok_or_else(|| {
                format!(
                    "room file {}: unknown exit direction '{}'",
                    path.display(),
                    direction
                )
            })?;
            exits.push((parsed, parse_room_url(url)?));
        }

        let log_root = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            port: file.port,
            bind_addr,
            log_root,
            idle_timeout: file.idle_timeout_secs.map(Duration::from_secs),
            name: file.name,
            description: file.description,
            items: file.items,
            exits,
        })
    }

    pub fn build_room(&self) -> RoomState {
        RoomState::new(
            self.name.clone(),
            self.description.clone(),
            self.items.clone(),
            self.exits.clone(),
        )
    }
}

pub fn parse_room_url(url: &str) -> Result<NeighborAddr, String> {
    let rest = url
        .strip_prefix("room://")
        .ok_or_else(|| format!("invalid room URL '{}': expected room://host:port", url))?;
    let (host, port_str) = rest
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid room URL '{}': missing port", url))?;
    if host.is_empty() {
        return Err(format!("invalid room URL '{}': missing host", url));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("invalid room URL '{}': bad port '{}'", url, port_str))?;
    Ok(NeighborAddr {
        host: host.to_string(),
        port,
    })
}
