//! Gateway configuration – reads `~/.trashbot/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trashbot_gateway::ServerConfig;
use trashbot_hal::{DriveConfig, LidMotion};
use trashbot_runtime::SchedulerConfig;
use trashbot_types::{BotError, LidSpec};

/// Full gateway configuration.  Every section may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub motion: SchedulerConfig,
    pub drive: DriveConfig,
    pub lid_motion: LidMotion,
    pub lids: Vec<LidSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            motion: SchedulerConfig::default(),
            drive: DriveConfig::default(),
            lid_motion: LidMotion::default(),
            lids: LidSpec::default_set(),
        }
    }
}

impl Config {
    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<(), BotError> {
        let invalid = |msg: String| Err(BotError::Config(msg));

        if self.motion.tick_period_ms == 0 {
            return invalid("motion.tick_period_ms must be greater than 0".into());
        }
        if self.lid_motion.hold_ms == 0 {
            return invalid("lid_motion.hold_ms must be greater than 0".into());
        }
        if self.lids.is_empty() {
            return invalid("at least one [[lids]] entry is required".into());
        }

        let mut ids = HashSet::new();
        let mut channels = HashSet::new();
        for lid in &self.lids {
            if !ids.insert(lid.id) {
                return invalid(format!("duplicate lid id {}", lid.id.0));
            }
            if !channels.insert(lid.servo_channel) {
                return invalid(format!(
                    "servo channel {} is used by more than one lid",
                    lid.servo_channel
                ));
            }
        }

        let drive = &self.drive;
        if drive.left_channel == drive.right_channel {
            return invalid("drive.left_channel and drive.right_channel must differ".into());
        }
        if drive.max_speed < 0 || drive.drive_speed < 0 || drive.turn_speed < 0 {
            return invalid("drive speeds must not be negative".into());
        }
        if drive.drive_speed > drive.max_speed || drive.turn_speed > drive.max_speed {
            return invalid(format!(
                "drive_speed and turn_speed must not exceed max_speed ({})",
                drive.max_speed
            ));
        }

        let lm = &self.lid_motion;
        if lm.min_pulse_us >= lm.max_pulse_us {
            return invalid("lid_motion.min_pulse_us must be below max_pulse_us".into());
        }
        if lm.open_angle_deg > 180 || lm.closed_angle_deg > 180 {
            return invalid("lid angles must be within 0..=180 degrees".into());
        }

        let server = &self.server;
        server.socket_addr()?;
        if server.handshake_timeout_ms == 0 {
            return invalid("server.handshake_timeout_ms must be greater than 0".into());
        }
        if server.ping_timeout_ms < server.ping_interval_ms {
            return invalid("server.ping_timeout_ms must be at least ping_interval_ms".into());
        }
        Ok(())
    }
}

/// Return `$TRASHBOT_CONFIG`, or `~/.trashbot/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TRASHBOT_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".trashbot").join("config.toml")
}

/// Load the config and apply `TRASHBOT_*` overrides.  A missing file yields
/// the defaults.
pub fn load() -> Result<Config, BotError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BotError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BotError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| BotError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `TRASHBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TRASHBOT_BIND_ADDRESS` | `server.bind_address` |
/// | `TRASHBOT_PORT` | `server.port` |
/// | `TRASHBOT_TICK_MS` | `motion.tick_period_ms` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TRASHBOT_BIND_ADDRESS") {
        cfg.server.bind_address = v;
    }
    if let Ok(v) = std::env::var("TRASHBOT_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.server.port = port;
    }
    if let Ok(v) = std::env::var("TRASHBOT_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.motion.tick_period_ms = ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trashbot_types::LidId;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = config_path_for_home(&dir.path().to_string_lossy());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.motion.tick_period_ms, 50);
        assert_eq!(cfg.lids.len(), 3);
    }

    #[test]
    fn config_path_points_to_trashbot_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".trashbot"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            &dir,
            r#"
                [server]
                port = 4100

                [lid_motion]
                hold_ms = 250
            "#,
        );
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.server.port, 4100);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.lid_motion.hold_ms, 250);
        assert_eq!(cfg.lid_motion.open_angle_deg, 60);
        assert_eq!(cfg.drive, DriveConfig::default());
        assert_eq!(cfg.lids, LidSpec::default_set());
    }

    #[test]
    fn lids_table_replaces_default_set() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            &dir,
            r#"
                [[lids]]
                id = 7
                name = "compost"
                servo_channel = 4
            "#,
        );
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.lids, vec![LidSpec::new(7, "compost", 4)]);
        cfg.validate().unwrap();
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[server\nport = ");
        assert!(matches!(load_from(&path), Err(BotError::Config(_))));
    }

    #[test]
    fn roundtrip_through_toml() {
        let cfg = Config::default();
        let raw = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&raw).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Config)>)> = vec![
            ("zero tick", Box::new(|c: &mut Config| c.motion.tick_period_ms = 0)),
            ("zero hold", Box::new(|c: &mut Config| c.lid_motion.hold_ms = 0)),
            ("no lids", Box::new(|c: &mut Config| c.lids.clear())),
            ("duplicate id", Box::new(|c: &mut Config| c.lids[1].id = LidId(1))),
            ("shared servo", Box::new(|c: &mut Config| c.lids[2].servo_channel = 0)),
            ("shared drive channel", Box::new(|c: &mut Config| c.drive.right_channel = c.drive.left_channel)),
            ("turn above max", Box::new(|c: &mut Config| c.drive.turn_speed = 150)),
            ("negative speed", Box::new(|c: &mut Config| c.drive.drive_speed = -5)),
            ("inverted pulses", Box::new(|c: &mut Config| c.lid_motion.min_pulse_us = 2500)),
            ("angle past 180", Box::new(|c: &mut Config| c.lid_motion.open_angle_deg = 200)),
            ("timeout below ping", Box::new(|c: &mut Config| c.server.ping_timeout_ms = 1000)),
            ("zero handshake timeout", Box::new(|c: &mut Config| c.server.handshake_timeout_ms = 0)),
            ("hostname bind", Box::new(|c: &mut Config| c.server.bind_address = "robot.local".into())),
        ];
        for (name, mutate) in cases {
            let mut cfg = Config::default();
            mutate(&mut cfg);
            assert!(
                matches!(cfg.validate(), Err(BotError::Config(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn apply_env_overrides_changes_port() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("TRASHBOT_PORT", "3999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.server.port, 3999);
        unsafe { std::env::remove_var("TRASHBOT_PORT") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_tick() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("TRASHBOT_TICK_MS", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.motion.tick_period_ms, 50);
        unsafe { std::env::remove_var("TRASHBOT_TICK_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_bind_address() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("TRASHBOT_BIND_ADDRESS", "127.0.0.1") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.server.bind_address, "127.0.0.1");
        unsafe { std::env::remove_var("TRASHBOT_BIND_ADDRESS") };
    }
}
