//! `.zicro.json` configuration (spec.md §6). Structure and error style are
//! grounded on `fresh`'s `config.rs`: per-field `#[serde(default = "...")]`
//! so partial files merge over built-ins, and a hand-written error enum
//! (no `thiserror`) with `Display` + `std::error::Error`.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(serde_json::Error),
    SerializeError(serde_json::Error),
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "config io error: {e}"),
            ConfigError::ParseError(e) => write!(f, "config parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "config serialize error: {e}"),
            ConfigError::ValidationError(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) | ConfigError::SerializeError(e) => Some(e),
            ConfigError::ValidationError(_) => None,
        }
    }
}

fn default_tab_width() -> u8 {
    4
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}
fn default_change_debounce_ms() -> u64 {
    32
}
fn default_did_save_debounce_ms() -> u64 {
    64
}
fn default_completion_debounce_ms() -> u64 {
    150
}
fn default_min_prefix_len() -> usize {
    1
}
fn default_hover_debounce_ms() -> u64 {
    300
}
fn default_hover_show_mode() -> HoverShowMode {
    HoverShowMode::Status
}
fn default_tooltip_max_width() -> u16 {
    80
}
fn default_tooltip_max_rows() -> u16 {
    20
}
fn default_typescript_mode() -> TypescriptMode {
    TypescriptMode::Auto
}
fn default_priority() -> i32 {
    0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoverShowMode {
    Status,
    Tooltip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypescriptMode {
    Auto,
    Tsls,
    Tsgo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_true")]
    pub auto: bool,
    #[serde(default = "default_completion_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_min_prefix_len")]
    pub min_prefix_len: usize,
    #[serde(default = "default_true")]
    pub trigger_on_dot: bool,
    #[serde(default = "default_true")]
    pub trigger_on_letters: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            auto: default_true(),
            debounce_ms: default_completion_debounce_ms(),
            min_prefix_len: default_min_prefix_len(),
            trigger_on_dot: default_true(),
            trigger_on_letters: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverConfig {
    #[serde(default = "default_true")]
    pub auto: bool,
    #[serde(default = "default_hover_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_hover_show_mode")]
    pub show_mode: HoverShowMode,
    #[serde(default = "default_true")]
    pub hide_on_type: bool,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            auto: default_true(),
            debounce_ms: default_hover_debounce_ms(),
            show_mode: default_hover_show_mode(),
            hide_on_type: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspUiConfig {
    #[serde(default = "default_tooltip_max_width")]
    pub tooltip_max_width: u16,
    #[serde(default = "default_tooltip_max_rows")]
    pub tooltip_max_rows: u16,
}

impl Default for LspUiConfig {
    fn default() -> Self {
        Self {
            tooltip_max_width: default_tooltip_max_width(),
            tooltip_max_rows: default_tooltip_max_rows(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypescriptServerConfig {
    #[serde(default = "default_typescript_mode")]
    pub mode: TypescriptMode,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub root_markers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZigServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub root_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspAdapterConfig {
    pub name: String,
    pub language: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub file_extensions: Vec<String>,
    #[serde(default)]
    pub root_markers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerOverrides {
    #[serde(default)]
    pub typescript: Option<TypescriptServerConfig>,
    #[serde(default)]
    pub zig: Option<ZigServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_change_debounce_ms")]
    pub change_debounce_ms: u64,
    #[serde(default = "default_did_save_debounce_ms")]
    pub did_save_debounce_ms: u64,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub hover: HoverConfig,
    #[serde(default)]
    pub ui: LspUiConfig,
    #[serde(default)]
    pub typescript: TypescriptServerConfig,
    #[serde(default)]
    pub zig: ZigServerConfig,
    #[serde(default)]
    pub adapters: Vec<LspAdapterConfig>,
    #[serde(default)]
    pub servers: ServerOverrides,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            change_debounce_ms: default_change_debounce_ms(),
            did_save_debounce_ms: default_did_save_debounce_ms(),
            completion: CompletionConfig::default(),
            hover: HoverConfig::default(),
            ui: LspUiConfig::default(),
            typescript: TypescriptServerConfig::default(),
            zig: ZigServerConfig::default(),
            adapters: Vec::new(),
            servers: ServerOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_false")]
    pub perf_overlay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_tab_width")]
    pub tab_width: u8,
    #[serde(default = "default_false")]
    pub autosave: bool,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub lsp: LspConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tab_width: default_tab_width(),
            autosave: default_false(),
            ui: UiConfig::default(),
            lsp: LspConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.tab_width) {
            return Err(ConfigError::ValidationError(format!(
                "tab_width must be 1..16, got {}",
                self.tab_width
            )));
        }
        if !(1..=1000).contains(&self.lsp.change_debounce_ms) {
            return Err(ConfigError::ValidationError(
                "lsp.change_debounce_ms must be 1..1000".into(),
            ));
        }
        if !(1..=1000).contains(&self.lsp.did_save_debounce_ms) {
            return Err(ConfigError::ValidationError(
                "lsp.did_save_debounce_ms must be 1..1000".into(),
            ));
        }
        if !(16..=240).contains(&self.lsp.ui.tooltip_max_width) {
            return Err(ConfigError::ValidationError(
                "lsp.ui.tooltip_max_width must be 16..240".into(),
            ));
        }
        if !(1..=40).contains(&self.lsp.ui.tooltip_max_rows) {
            return Err(ConfigError::ValidationError(
                "lsp.ui.tooltip_max_rows must be 1..40".into(),
            ));
        }
        for adapter in &self.lsp.adapters {
            if !(-1000..=1000).contains(&adapter.priority) {
                return Err(ConfigError::ValidationError(format!(
                    "lsp.adapters[{}].priority must be -1000..1000",
                    adapter.name
                )));
            }
        }
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: Config = serde_json::from_str(&text).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        fs::write(path, text).map_err(ConfigError::IoError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".zicro.json");
        fs::write(&path, r#"{"tab_width": 2}"#).unwrap();
        let cfg = Config::load_from_file(&path).unwrap();
        assert_eq!(cfg.tab_width, 2);
        assert!(!cfg.autosave);
        assert_eq!(cfg.lsp.change_debounce_ms, 32);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".zicro.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn out_of_range_tab_width_fails_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".zicro.json");
        fs::write(&path, r#"{"tab_width": 99}"#).unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn roundtrip_through_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".zicro.json");
        let mut cfg = Config::default();
        cfg.tab_width = 8;
        cfg.save_to_file(&path).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.tab_width, 8);
    }
}
