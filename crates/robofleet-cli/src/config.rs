//! Operator configuration – reads/writes `~/.robofleet/config.toml`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use robofleet_hal::{ControllerPolicy, DEFAULT_BAUD_RATE, TransportKind};
use robofleet_runtime::OrchestratorConfig;
use robofleet_types::{FleetError, TeamColor};
use serde::{Deserialize, Serialize};

/// Where robot commands go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    /// Simulated robots only.
    #[default]
    Sim,
    /// JSON datagrams to `command_addr`.
    Network,
    /// Newline-delimited JSON to `serial_path`.
    Serial,
}

impl Link {
    /// Transport kind requested from the orchestrator.
    pub fn transport_kind(self) -> TransportKind {
        match self {
            Link::Sim | Link::Network => TransportKind::Network,
            Link::Serial => TransportKind::Serial,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Sim => write!(f, "sim"),
            Link::Network => write!(f, "network"),
            Link::Serial => write!(f, "serial"),
        }
    }
}

impl FromStr for Link {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(Link::Sim),
            other => match other.parse::<TransportKind>()? {
                TransportKind::Network => Ok(Link::Network),
                TransportKind::Serial => Ok(Link::Serial),
            },
        }
    }
}

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub team: TeamColor,

    #[serde(default)]
    pub transport: Link,

    #[serde(default)]
    pub controller: ControllerPolicy,

    #[serde(default = "default_robot_slots")]
    pub robot_slots: usize,

    /// Robot radio bridge, used when `transport = "network"`.
    #[serde(default = "default_command_addr")]
    pub command_addr: String,

    /// Serial device, used when `transport = "serial"`.
    #[serde(default = "default_serial_path")]
    pub serial_path: PathBuf,

    /// Line speed of `serial_path`.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Give up if no vision frame arrives within this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_frame_timeout_ms: Option<u64>,
}

fn default_robot_slots() -> usize {
    6
}
fn default_command_addr() -> String {
    "127.0.0.1:20011".to_string()
}
fn default_serial_path() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            team: TeamColor::default(),
            transport: Link::default(),
            controller: ControllerPolicy::default(),
            robot_slots: default_robot_slots(),
            command_addr: default_command_addr(),
            serial_path: default_serial_path(),
            baud_rate: default_baud_rate(),
            first_frame_timeout_ms: None,
        }
    }
}

impl Config {
    /// Orchestrator settings derived from this file.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            team_color: self.team,
            robot_slots: self.robot_slots,
            controller: self.controller.config(),
            first_frame_timeout: self.first_frame_timeout_ms.map(Duration::from_millis),
            ..OrchestratorConfig::default()
        }
    }
}

/// Return the path to `~/.robofleet/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".robofleet").join("config.toml")
}

/// Load the config from disk and apply `ROBOFLEET_*` overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, FleetError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, FleetError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        FleetError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| FleetError::Configuration(format!("cannot parse {}: {e}", path.display())))
}

/// Apply `ROBOFLEET_*` environment variable overrides to `cfg`.  Values
/// that do not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROBOFLEET_TEAM` | `team` |
/// | `ROBOFLEET_TRANSPORT` | `transport` |
/// | `ROBOFLEET_CONTROLLER` | `controller` |
/// | `ROBOFLEET_COMMAND_ADDR` | `command_addr` |
/// | `ROBOFLEET_SERIAL_PATH` | `serial_path` |
/// | `ROBOFLEET_BAUD_RATE` | `baud_rate` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROBOFLEET_TEAM")
        && let Ok(team) = v.parse()
    {
        cfg.team = team;
    }
    if let Ok(v) = std::env::var("ROBOFLEET_TRANSPORT")
        && let Ok(link) = v.parse()
    {
        cfg.transport = link;
    }
    if let Ok(v) = std::env::var("ROBOFLEET_CONTROLLER")
        && let Ok(policy) = v.parse()
    {
        cfg.controller = policy;
    }
    if let Ok(v) = std::env::var("ROBOFLEET_COMMAND_ADDR") {
        cfg.command_addr = v;
    }
    if let Ok(v) = std::env::var("ROBOFLEET_SERIAL_PATH") {
        cfg.serial_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("ROBOFLEET_BAUD_RATE")
        && let Ok(baud) = v.trim().parse()
    {
        cfg.baud_rate = baud;
    }
}

/// Save the config to disk, creating `~/.robofleet/` if necessary.
pub fn save(cfg: &Config) -> Result<(), FleetError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), FleetError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FleetError::Configuration(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| FleetError::Configuration(format!("cannot serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| FleetError::Configuration(format!("cannot write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded.robot_slots, 6);
        assert_eq!(loaded.command_addr, "127.0.0.1:20011");
        assert_eq!(loaded.transport, Link::Sim);
        assert_eq!(loaded.first_frame_timeout_ms, None);
        assert_eq!(loaded.baud_rate, 115_200);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "team = \"yellow\"\ncontroller = \"raw\"\nfirst_frame_timeout_ms = 2500\nbaud_rate = 921600\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.team, TeamColor::Yellow);
        assert_eq!(cfg.controller, ControllerPolicy::Raw);
        assert_eq!(cfg.serial_path, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(cfg.baud_rate, 921_600);

        let orch = cfg.orchestrator();
        assert_eq!(orch.team_color, TeamColor::Yellow);
        assert_eq!(orch.first_frame_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(orch.controller, ControllerPolicy::Raw.config());
    }

    #[test]
    fn malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "robot_slots = \"many\"").unwrap();
        assert!(matches!(load_from(&path), Err(FleetError::Configuration(_))));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_robofleet_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.robofleet/config.toml"));
    }

    #[test]
    fn link_parsing() {
        assert_eq!("SIM".parse::<Link>().unwrap(), Link::Sim);
        assert_eq!("udp".parse::<Link>().unwrap(), Link::Network);
        assert_eq!("serial".parse::<Link>().unwrap(), Link::Serial);
        assert!("bluetooth".parse::<Link>().is_err());
        assert_eq!(Link::Serial.transport_kind(), TransportKind::Serial);
        assert_eq!(Link::Sim.transport_kind(), TransportKind::Network);
    }

    // Every env-override case lives in one test so no two tests race on the
    // same variables.
    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: the only test in this binary that touches ROBOFLEET_* vars.
        unsafe {
            std::env::set_var("ROBOFLEET_TEAM", "yellow");
            std::env::set_var("ROBOFLEET_TRANSPORT", "serial");
            std::env::set_var("ROBOFLEET_CONTROLLER", "not-a-policy");
            std::env::set_var("ROBOFLEET_COMMAND_ADDR", "10.0.0.7:10010");
            std::env::set_var("ROBOFLEET_SERIAL_PATH", "/dev/ttyACM1");
            std::env::set_var("ROBOFLEET_BAUD_RATE", "fast");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            for var in [
                "ROBOFLEET_TEAM",
                "ROBOFLEET_TRANSPORT",
                "ROBOFLEET_CONTROLLER",
                "ROBOFLEET_COMMAND_ADDR",
                "ROBOFLEET_SERIAL_PATH",
                "ROBOFLEET_BAUD_RATE",
            ] {
                std::env::remove_var(var);
            }
        }

        assert_eq!(cfg.team, TeamColor::Yellow);
        assert_eq!(cfg.transport, Link::Serial);
        assert_eq!(cfg.controller, ControllerPolicy::SaturatedFiltered);
        assert_eq!(cfg.command_addr, "10.0.0.7:10010");
        assert_eq!(cfg.serial_path, PathBuf::from("/dev/ttyACM1"));
        assert_eq!(cfg.baud_rate, DEFAULT_BAUD_RATE);
    }
}
