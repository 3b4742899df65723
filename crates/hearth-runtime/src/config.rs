//! Controller configuration loading (`hearth.toml`).

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::messaging::MqttSettings;
use crate::persist::WriteMode;

pub const DEFAULT_CONFIG_FILE: &str = "hearth.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub device_name: SmolStr,
    /// Boot script expanded into the command queue after the stored state loads.
    pub script: Option<PathBuf>,
    pub storage_path: PathBuf,
    pub write_mode: WriteMode,
    pub log_level: SmolStr,
    pub console_stdin: bool,
    /// Host and port the telnet console is started on at boot.
    pub telnet_listen: Option<(SmolStr, u16)>,
    pub mqtt: Option<MqttSettings>,
    pub tick: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device_name: SmolStr::new("hearth"),
            script: None,
            storage_path: PathBuf::from("state.json"),
            write_mode: WriteMode::Overwrite,
            log_level: SmolStr::new("info"),
            console_stdin: true,
            telnet_listen: None,
            mqtt: None,
            tick: Duration::from_millis(10),
        }
    }
}

impl RuntimeConfig {
    /// Reads a config file; relative paths inside it resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| RuntimeError::InvalidConfig(format!("{}: {err}", path.display()).into()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&text, base)
    }

    pub fn parse(text: &str, base: &Path) -> Result<Self, RuntimeError> {
        let raw: HearthToml = toml::from_str(text)
            .map_err(|err| RuntimeError::InvalidConfig(format!("{DEFAULT_CONFIG_FILE}: {err}").into()))?;
        raw.into_config(base)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HearthToml {
    device: Option<DeviceSection>,
    storage: Option<StorageSection>,
    log: Option<LogSection>,
    console: Option<ConsoleSection>,
    mqtt: Option<MqttSection>,
    #[serde(rename = "loop")]
    control_loop: Option<LoopSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceSection {
    name: Option<String>,
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StorageSection {
    path: Option<String>,
    write_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConsoleSection {
    stdin: Option<bool>,
    telnet_listen: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MqttSection {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    prefix: Option<String>,
    keep_alive_s: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoopSection {
    tick_ms: u64,
}

impl HearthToml {
    fn into_config(self, base: &Path) -> Result<RuntimeConfig, RuntimeError> {
        let defaults = RuntimeConfig::default();
        let resolve = |raw: String| {
            let path = PathBuf::from(raw);
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };

        let (device_name, script) = match self.device {
            Some(device) => (
                device.name.map_or(defaults.device_name, SmolStr::new),
                device.script.map(&resolve),
            ),
            None => (defaults.device_name, None),
        };
        if device_name.trim().is_empty() {
            return Err(RuntimeError::InvalidConfig("device.name must not be empty".into()));
        }

        let (storage_path, write_mode) = match self.storage {
            Some(storage) => (
                storage
                    .path
                    .map_or_else(|| base.join(&defaults.storage_path), &resolve),
                match storage.write_mode {
                    Some(mode) => WriteMode::parse(&mode)?,
                    None => defaults.write_mode,
                },
            ),
            None => (base.join(&defaults.storage_path), defaults.write_mode),
        };

        let log_level = match self.log {
            Some(log) => parse_log_level(&log.level)?,
            None => defaults.log_level,
        };

        let (console_stdin, telnet_listen) = match self.console {
            Some(console) => (
                console.stdin.unwrap_or(defaults.console_stdin),
                console
                    .telnet_listen
                    .as_deref()
                    .map(parse_listen)
                    .transpose()?,
            ),
            None => (defaults.console_stdin, None),
        };

        let mqtt = match self.mqtt {
            Some(section) if section.enabled.unwrap_or(true) => {
                let settings = MqttSettings::default();
                let host = section.host.map_or(settings.host, SmolStr::new);
                if host.trim().is_empty() {
                    return Err(RuntimeError::InvalidConfig("mqtt.host must not be empty".into()));
                }
                let keep_alive_s = section.keep_alive_s.unwrap_or(settings.keep_alive.as_secs());
                if keep_alive_s == 0 {
                    return Err(RuntimeError::InvalidConfig("mqtt.keep_alive_s must be >= 1".into()));
                }
                Some(MqttSettings {
                    host,
                    port: section.port.unwrap_or(settings.port),
                    client_id: section
                        .client_id
                        .map_or_else(|| device_name.clone(), SmolStr::new),
                    prefix: section
                        .prefix
                        .map_or_else(|| device_name.clone(), SmolStr::new),
                    keep_alive: Duration::from_secs(keep_alive_s),
                })
            }
            _ => None,
        };

        let tick = match self.control_loop {
            Some(section) if section.tick_ms == 0 => {
                return Err(RuntimeError::InvalidConfig("loop.tick_ms must be >= 1".into()))
            }
            Some(section) => Duration::from_millis(section.tick_ms),
            None => defaults.tick,
        };

        Ok(RuntimeConfig {
            device_name,
            script,
            storage_path,
            write_mode,
            log_level,
            console_stdin,
            telnet_listen,
            mqtt,
            tick,
        })
    }
}

fn parse_listen(text: &str) -> Result<(SmolStr, u16), RuntimeError> {
    let invalid = || {
        RuntimeError::InvalidConfig(
            format!("invalid console.telnet_listen '{text}' (expected host:port)").into(),
        )
    };
    let (host, port) = text.trim().rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((SmolStr::new(host), port))
}

fn parse_log_level(text: &str) -> Result<SmolStr, RuntimeError> {
    let level = text.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(SmolStr::new(level)),
        _ => Err(RuntimeError::InvalidConfig(
            format!("invalid log.level '{text}' (expected trace/debug/info/warn/error)").into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults_rooted_at_base() {
        let config = RuntimeConfig::parse("", Path::new("/etc/hearth")).expect("config");
        assert_eq!(config.storage_path, PathBuf::from("/etc/hearth/state.json"));
        assert_eq!(config.write_mode, WriteMode::Overwrite);
        assert_eq!(config.log_level, "info");
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn full_file_is_parsed() {
        let text = r#"
[device]
name = "kitchen"
script = "boot.txt"

[storage]
path = "/var/lib/hearth/state.json"
write_mode = "atomic"

[log]
level = "DEBUG"

[console]
stdin = false
telnet_listen = "0.0.0.0:2323"

[mqtt]
host = "broker.lan"
port = 8883
keep_alive_s = 15

[loop]
tick_ms = 25
"#;
        let config = RuntimeConfig::parse(text, Path::new("/etc/hearth")).expect("config");
        assert_eq!(config.device_name, "kitchen");
        assert_eq!(config.script, Some(PathBuf::from("/etc/hearth/boot.txt")));
        assert_eq!(config.storage_path, PathBuf::from("/var/lib/hearth/state.json"));
        assert_eq!(config.write_mode, WriteMode::Atomic);
        assert_eq!(config.log_level, "debug");
        assert!(!config.console_stdin);
        assert_eq!(
            config.telnet_listen,
            Some((SmolStr::new("0.0.0.0"), 2323))
        );
        let mqtt = config.mqtt.expect("mqtt");
        assert_eq!(mqtt.host, "broker.lan");
        assert_eq!(mqtt.port, 8883);
        assert_eq!(mqtt.prefix, "kitchen");
        assert_eq!(mqtt.keep_alive, Duration::from_secs(15));
        assert_eq!(config.tick, Duration::from_millis(25));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = Path::new(".");
        for text in [
            "[storage]\nwrite_mode = \"journal\"",
            "[log]\nlevel = \"loud\"",
            "[loop]\ntick_ms = 0",
            "[mqtt]\nhost = \"\"",
            "[unknown]\nx = 1",
            "[console]\ntelnet_listen = \"2323\"",
        ] {
            assert!(
                matches!(
                    RuntimeConfig::parse(text, base),
                    Err(RuntimeError::InvalidConfig(_))
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn disabled_mqtt_is_none() {
        let config =
            RuntimeConfig::parse("[mqtt]\nenabled = false\nhost = \"x\"", Path::new("."))
                .expect("config");
        assert!(config.mqtt.is_none());
    }
}
