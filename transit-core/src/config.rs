//! Configuration file management for transit-decode.
//!
//! Reads/writes `~/.transit-decode/config.yaml` (or `$TRANSIT_CONFIG`) with
//! obfuscation defaults for exports and output preferences for the CLI.

use std::path::PathBuf;
use std::str::FromStr;

use crate::obfuscate::ObfuscationOptions;
use crate::types::TransitError;

/// Full configuration structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub obfuscation: ObfuscationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObfuscationConfig {
    pub dates: bool,
    pub times: bool,
    pub fares: bool,
    /// Fixed RNG seed for reproducible exports; random when unset.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub show_extra: bool,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        ObfuscationConfig {
            dates: true,
            times: true,
            fares: true,
            seed: None,
        }
    }
}

impl ObfuscationConfig {
    pub fn options(&self) -> ObfuscationOptions {
        ObfuscationOptions {
            dates: self.dates,
            times: self.times,
            fares: self.fares,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(TransitError::Config(format!("unknown output format: {other}"))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        })
    }
}

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "TRANSIT_CONFIG";

/// `~/.transit-decode/`, relative to the working directory when no home is set.
pub fn config_dir() -> PathBuf {
    ["HOME", "USERPROFILE"]
        .into_iter()
        .filter_map(std::env::var_os)
        .find(|home| !home.is_empty())
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".transit-decode")
}

/// `$TRANSIT_CONFIG` if set, else `config.yaml` in [`config_dir`].
pub fn config_file() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_dir().join("config.yaml"),
    }
}

/// Load config from [`config_file`].
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(text) => parse_config(&text),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
            Config::default()
        }
    }
}

/// Save config to [`config_file`], creating its directory.
pub fn save_config(config: &Config) -> Result<PathBuf, TransitError> {
    let path = config_file();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| TransitError::Config(format!("{}: {e}", dir.display())))?;
    }
    std::fs::write(&path, serialize_config(config))
        .map_err(|e| TransitError::Config(format!("{}: {e}", path.display())))?;

    Ok(path)
}

/// Parse simple YAML-like config text. Unknown keys and bad values are
/// ignored with a warning.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        match (current_section.as_deref(), key) {
            (Some("obfuscation"), "dates") => set_bool(&mut config.obfuscation.dates, key, val),
            (Some("obfuscation"), "times") => set_bool(&mut config.obfuscation.times, key, val),
            (Some("obfuscation"), "fares") => set_bool(&mut config.obfuscation.fares, key, val),
            (Some("obfuscation"), "seed") => match parse_scalar(val).map(str::parse::<u64>) {
                None => config.obfuscation.seed = None,
                Some(Ok(seed)) => config.obfuscation.seed = Some(seed),
                Some(Err(e)) => tracing::warn!(key, value = val, error = %e, "expected an integer seed"),
            },
            (Some("output"), "format") => {
                if let Some(v) = parse_scalar(val) {
                    match v.parse() {
                        Ok(format) => config.output.format = format,
                        Err(e) => tracing::warn!(error = %e, "ignoring config value"),
                    }
                }
            }
            (Some("output"), "show_extra") => set_bool(&mut config.output.show_extra, key, val),
            (section, key) => tracing::debug!(?section, key, "ignoring unknown config key"),
        }
    }

    config
}

fn set_bool(target: &mut bool, key: &str, val: &str) {
    match parse_scalar(val).and_then(parse_bool_value) {
        Some(b) => *target = b,
        None => tracing::warn!(key, value = val, "expected true/false"),
    }
}

/// A scalar with any trailing ` # comment` and surrounding quotes removed.
/// `null`, `~` and empty values are absent.
fn parse_scalar(val: &str) -> Option<&str> {
    let val = match val.find(" #") {
        Some(i) => val[..i].trim_end(),
        None => val,
    };
    let val = ["\"", "'"]
        .into_iter()
        .find_map(|q| val.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(val);
    (!matches!(val, "" | "null" | "~")).then_some(val)
}

fn parse_bool_value(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# transit-decode configuration".to_string(), String::new()];

    lines.push("obfuscation:".into());
    lines.push(format!("  dates: {}", config.obfuscation.dates));
    lines.push(format!("  times: {}", config.obfuscation.times));
    lines.push(format!("  fares: {}", config.obfuscation.fares));
    match config.obfuscation.seed {
        Some(seed) => lines.push(format!("  seed: {seed}")),
        None => lines.push("  seed: null".into()),
    }
    lines.push(String::new());

    lines.push("output:".into());
    lines.push(format!("  format: {}", config.output.format));
    lines.push(format!("  show_extra: {}", config.output.show_extra));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
