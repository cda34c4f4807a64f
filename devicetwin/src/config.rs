//! Device configuration.
//!
//! Loaded from YAML (or JSON when the file ends in `.json`). The hub host and
//! device id are what provisioning hands over; everything else has defaults.
//!
//! ```yaml
//! hub_host: my-hub.azure-devices.net
//! device_id: thermostat-1
//! sas_token: "SharedAccessSignature sr=..."
//! session:
//!   duration_secs: 250
//!   telemetry_interval_secs: 10
//! twin:
//!   desired_property: targetTemperature
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::queue::DEFAULT_CAPACITY;
use crate::state::DEFAULT_BASELINE;
use crate::topic::{METHODS_ROOT, TWIN_ROOT, Topics};

/// API version sent in the MQTT username.
pub const API_VERSION: &str = "2018-06-30";

/// Configuration for one device session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Hub host name.
    pub hub_host: String,

    /// Hub MQTT port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Device identity registered with the hub.
    pub device_id: String,

    /// Shared access signature used as the MQTT password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<String>,

    /// MQTT client id. Defaults to the device id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker to accept the connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Use TLS with the platform's default roots.
    #[serde(default = "default_tls")]
    pub tls: bool,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub twin: TwinConfig,
}

/// Session loop timing and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Watchdog: how long the session runs before teardown.
    pub duration_secs: u64,
    /// Bounded wait for each queue pop.
    pub poll_interval_ms: u64,
    /// Bounded wait for each queue push from the receive path.
    pub push_timeout_ms: u64,
    /// Event queue capacity.
    pub queue_capacity: usize,
    /// Telemetry period. Zero disables telemetry.
    pub telemetry_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 250,
            poll_interval_ms: 500,
            push_timeout_ms: 500,
            queue_capacity: DEFAULT_CAPACITY,
            telemetry_interval_secs: 0,
        }
    }
}

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Telemetry period, if enabled.
    pub fn telemetry_interval(&self) -> Option<Duration> {
        (self.telemetry_interval_secs > 0).then(|| Duration::from_secs(self.telemetry_interval_secs))
    }
}

/// Twin property names and topic roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    /// Desired property reconciled into local state.
    pub desired_property: String,
    /// Reported property carrying the session maximum.
    pub max_property: String,
    /// Temperature the session starts from.
    pub baseline: f64,
    pub twin_root: String,
    pub methods_root: String,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            desired_property: "targetTemperature".to_string(),
            max_property: "maxTempSinceLastReboot".to_string(),
            baseline: DEFAULT_BASELINE,
            twin_root: TWIN_ROOT.to_string(),
            methods_root: METHODS_ROOT.to_string(),
        }
    }
}

fn default_port() -> u16 {
    8883
}

fn default_keep_alive() -> u64 {
    240
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_tls() -> bool {
    true
}

impl DeviceConfig {
    /// Config for a device with every optional field at its default.
    pub fn new(hub_host: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            hub_host: hub_host.into(),
            port: default_port(),
            device_id: device_id.into(),
            sas_token: None,
            client_id: None,
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            tls: default_tls(),
            session: SessionConfig::default(),
            twin: TwinConfig::default(),
        }
    }

    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&data)?,
            _ => serde_yaml::from_str(&data)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configs no session can run with.
    pub fn validate(&self) -> Result<()> {
        if self.hub_host.trim().is_empty() {
            return Err(Error::InvalidConfig("hub_host is empty".to_string()));
        }
        if self.device_id.trim().is_empty() {
            return Err(Error::InvalidConfig("device_id is empty".to_string()));
        }
        if self.session.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue_capacity must be positive".to_string()));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be positive".to_string()));
        }
        if self.twin.desired_property.is_empty() || self.twin.max_property.is_empty() {
            return Err(Error::InvalidConfig("twin property name is empty".to_string()));
        }
        if !self.twin.baseline.is_finite() {
            return Err(Error::InvalidConfig("baseline is not finite".to_string()));
        }
        Ok(())
    }

    /// MQTT client id.
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(&self.device_id)
    }

    /// MQTT username expected by the hub.
    pub fn username(&self) -> String {
        format!("{}/{}/?api-version={}", self.hub_host, self.device_id, API_VERSION)
    }

    /// Topic set for this device.
    pub fn topics(&self) -> Result<Topics> {
        Topics::with_roots(&self.device_id, &self.twin.twin_root, &self.twin.methods_root)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let c = DeviceConfig::from_yaml("hub_host: hub.example.net\ndevice_id: dev-1\n").unwrap();
        assert_eq!(c.port, 8883);
        assert!(c.tls);
        assert_eq!(c.keep_alive_secs, 240);
        assert_eq!(c.client_id(), "dev-1");
        assert_eq!(c.session.duration(), Duration::from_secs(250));
        assert_eq!(c.session.poll_interval(), Duration::from_millis(500));
        assert_eq!(c.session.push_timeout(), Duration::from_millis(500));
        assert_eq!(c.session.queue_capacity, 10);
        assert_eq!(c.session.telemetry_interval(), None);
        assert_eq!(c.twin.desired_property, "targetTemperature");
        assert_eq!(c.twin.max_property, "maxTempSinceLastReboot");
        assert_eq!(c.twin.baseline, 22.0);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
hub_host: hub.example.net
port: 1883
device_id: dev-1
client_id: dev-1-client
sas_token: secret
tls: false
session:
  duration_secs: 30
  telemetry_interval_secs: 5
twin:
  desired_property: setpoint
  baseline: 18.5
"#;
        let c = DeviceConfig::from_yaml(yaml).unwrap();
        assert_eq!(c.port, 1883);
        assert!(!c.tls);
        assert_eq!(c.client_id(), "dev-1-client");
        assert_eq!(c.sas_token.as_deref(), Some("secret"));
        assert_eq!(c.session.duration_secs, 30);
        assert_eq!(c.session.poll_interval_ms, 500);
        assert_eq!(c.session.telemetry_interval(), Some(Duration::from_secs(5)));
        assert_eq!(c.twin.desired_property, "setpoint");
        assert_eq!(c.twin.max_property, "maxTempSinceLastReboot");
        assert_eq!(c.twin.baseline, 18.5);
    }

    #[test]
    fn test_username() {
        let c = DeviceConfig::new("hub.example.net", "dev-1");
        assert_eq!(c.username(), "hub.example.net/dev-1/?api-version=2018-06-30");
    }

    #[test]
    fn test_validate() {
        assert!(DeviceConfig::from_yaml("hub_host: ''\ndevice_id: d\n").is_err());
        assert!(DeviceConfig::from_yaml("hub_host: h\ndevice_id: ' '\n").is_err());
        assert!(DeviceConfig::from_yaml("hub_host: h\n").is_err());

        let mut c = DeviceConfig::new("h", "d");
        c.session.queue_capacity = 0;
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = DeviceConfig::new("h", "d");
        c.twin.max_property.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_topics() {
        let c = DeviceConfig::new("h", "dev-1");
        let t = c.topics().unwrap();
        assert_eq!(t.device_id(), "dev-1");
        assert_eq!(t.twin_get("0"), "$iothub/twin/GET/?$rid=0");
    }

    #[test]
    fn test_load_json() {
        let dir = std::env::temp_dir().join(format!("devicetwin-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device.json");
        std::fs::write(&path, r#"{"hub_host":"h","device_id":"d","port":1883}"#).unwrap();
        let c = DeviceConfig::load(&path).unwrap();
        assert_eq!(c.port, 1883);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
