use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::buffer::DEFAULT_BUFFER_CAPACITY;
use crate::errors::CoreError;
use crate::output::hex::DEFAULT_BYTES_PER_LINE;

/// Serial port configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialConfig {
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_flow_control")]
    pub flow_control: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            flow_control: default_flow_control(),
        }
    }
}

/// How received bytes are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Ascii,
    Hex,
}

/// Terminal behaviour: buffering, line endings, rendering and sending.
///
/// - `buffer_capacity`: bytes of history kept for replay/save.
/// - `crlf_auto`: normalize received line endings to `\r\n`.
/// - `char_delay_ms` / `line_delay_ms`: pacing when sending files.
/// - `macros`: name → macro string (see [`crate::macros::parse_macro`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub crlf_auto: bool,
    #[serde(default)]
    pub local_echo: bool,
    #[serde(default)]
    pub view: View,
    #[serde(default = "default_hex_bytes_per_line")]
    pub hex_bytes_per_line: usize,
    #[serde(default = "default_hex_show_index")]
    pub hex_show_index: bool,
    #[serde(default)]
    pub char_delay_ms: u64,
    #[serde(default)]
    pub line_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            crlf_auto: false,
            local_echo: false,
            view: View::default(),
            hex_bytes_per_line: default_hex_bytes_per_line(),
            hex_show_index: default_hex_show_index(),
            char_delay_ms: 0,
            line_delay_ms: 0,
            log_file: None,
            macros: BTreeMap::new(),
        }
    }
}

/// Everything persisted in `settings.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

impl Settings {
    /// Load settings from `path`.
    ///
    /// A missing file yields defaults; a file that exists but cannot be
    /// parsed is an error so a typo does not silently reset the user's
    /// configuration.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(CoreError::Io(e)),
        };
        let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
            CoreError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings to `path` as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("Failed to serialize settings: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.terminal.buffer_capacity == 0 {
            return Err(CoreError::Config(
                "bufferCapacity must be greater than zero".into(),
            ));
        }
        if self.terminal.hex_bytes_per_line == 0 {
            return Err(CoreError::Config(
                "hexBytesPerLine must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Default settings file: `<config dir>/sellerie/settings.json`.
    pub fn default_path() -> PathBuf {
        config_dir().join("settings.json")
    }
}

/// Get the platform config directory for Sellerie.
fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("sellerie");
    }
    if let Ok(home) = std::env::var("HOME") {
        #[cfg(target_os = "macos")]
        return PathBuf::from(&home)
            .join("Library")
            .join("Application Support")
            .join("sellerie");
        #[cfg(not(target_os = "macos"))]
        return PathBuf::from(&home).join(".config").join("sellerie");
    }
    PathBuf::from(".config").join("sellerie")
}

// --- Default value functions ---

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_flow_control() -> String {
    "none".to_string()
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_hex_bytes_per_line() -> usize {
    DEFAULT_BYTES_PER_LINE
}

fn default_hex_show_index() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn serial_config_default() {
        let cfg = SerialConfig::default();
        assert!(cfg.port.is_empty());
        assert_eq!(cfg.baud_rate, 115200);
        assert_eq!(cfg.data_bits, 8);
        assert_eq!(cfg.stop_bits, 1);
        assert_eq!(cfg.parity, "none");
        assert_eq!(cfg.flow_control, "none");
    }

    #[test]
    fn terminal_config_default() {
        let cfg = TerminalConfig::default();
        assert_eq!(cfg.buffer_capacity, 131_072);
        assert!(!cfg.crlf_auto);
        assert!(!cfg.local_echo);
        assert_eq!(cfg.view, View::Ascii);
        assert_eq!(cfg.hex_bytes_per_line, 16);
        assert!(cfg.hex_show_index);
        assert_eq!(cfg.char_delay_ms, 0);
        assert_eq!(cfg.line_delay_ms, 0);
        assert!(cfg.log_file.is_none());
        assert!(cfg.macros.is_empty());
    }

    #[test]
    fn serial_config_uses_camel_case() {
        let json = serde_json::json!({
            "port": "/dev/ttyUSB0",
            "baudRate": 9600,
            "dataBits": 7,
            "stopBits": 2,
            "parity": "even",
            "flowControl": "hardware"
        });
        let cfg: SerialConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.port, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.data_bits, 7);
        assert_eq!(cfg.stop_bits, 2);
        assert_eq!(cfg.parity, "even");
        assert_eq!(cfg.flow_control, "hardware");
    }

    #[test]
    fn partial_terminal_config_fills_defaults() {
        let json = r#"{"crlfAuto": true, "view": "hex", "macros": {"reset": "AT+RST\\r\\n"}}"#;
        let cfg: TerminalConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.crlf_auto);
        assert_eq!(cfg.view, View::Hex);
        assert_eq!(cfg.buffer_capacity, 131_072);
        assert_eq!(cfg.macros["reset"], "AT+RST\\r\\n");
    }

    #[test]
    fn empty_object_is_default_settings() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.serial.port = "COM3".into();
        settings.terminal.crlf_auto = true;
        settings.terminal.log_file = Some("/tmp/serial.log".into());
        settings
            .terminal
            .macros
            .insert("hello".into(), "hi\\r".into());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nonexistent.json");
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn corrupt_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "not valid json!!!").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)), "got: {err:?}");
    }

    #[test]
    fn zero_capacity_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"terminal": {"bufferCapacity": 0}}"#).unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("bufferCapacity"));
    }

    #[test]
    fn zero_hex_width_rejected() {
        let mut settings = Settings::default();
        settings.terminal.hex_bytes_per_line = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn default_path_ends_with_settings_json() {
        let path = Settings::default_path();
        assert!(path.ends_with("sellerie/settings.json"));
    }
}
