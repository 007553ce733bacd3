use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::time::parse_duration_str;

pub const DATA_FORMATS: &[&str] = &["json", "influx"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub interval: Duration,
    pub global_tags: Vec<(String, String)>,
    pub exec_command: Vec<String>,
    pub exec_data_format: String,
    pub exec_name_suffix: String,
    pub exec_timeout: Duration,
    pub output_kind: String,
    pub output_endpoint: Option<String>,
    pub output_namespace: String,
    pub output_max_batch_size: usize,
    pub output_max_dimensions: usize,
    pub output_routing_tag: Option<String>,
    pub output_headers: Vec<(String, String)>,
    pub output_compression: String,
    pub output_timeout: Duration,
    pub output_tls_ca: Option<PathBuf>,
    pub output_tls_cert: Option<PathBuf>,
    pub output_tls_key: Option<PathBuf>,
    pub output_tls_insecure_skip_verify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            global_tags: Vec::new(),
            exec_command: Vec::new(),
            exec_data_format: "json".to_string(),
            exec_name_suffix: String::new(),
            exec_timeout: Duration::from_secs(5),
            output_kind: "stdout".to_string(),
            output_endpoint: None,
            output_namespace: "Tally/Agent".to_string(),
            output_max_batch_size: 20,
            output_max_dimensions: 10,
            output_routing_tag: None,
            output_headers: Vec::new(),
            output_compression: "none".to_string(),
            output_timeout: Duration::from_secs(10),
            output_tls_ca: None,
            output_tls_cert: None,
            output_tls_key: None,
            output_tls_insecure_skip_verify: false,
        }
    }
}

impl Config {
    /// Defaults, then the config file (if present), then `TALLY_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_max_batch_size == 0 {
            return Err(TallyError::Config(
                "output_max_batch_size must be at least 1".to_string(),
            ));
        }
        if !DATA_FORMATS.contains(&self.exec_data_format.as_str()) {
            return Err(TallyError::Config(format!(
                "unsupported exec_data_format {}; must be one of {}",
                self.exec_data_format,
                DATA_FORMATS.join(", ")
            )));
        }
        if self.interval.is_zero() {
            return Err(TallyError::Config("interval must be non-zero".to_string()));
        }
        if self.output_tls_cert.is_some() != self.output_tls_key.is_some() {
            return Err(TallyError::Config(
                "output_tls_cert and output_tls_key must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Like [`Config::validate`], additionally requiring a collector command.
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate()?;
        if self.exec_command.is_empty() {
            return Err(TallyError::Config(
                "exec_command must name the collector to run".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    interval: Option<String>,
    global_tags: Option<String>,
    exec_command: Option<Vec<String>>,
    exec_data_format: Option<String>,
    exec_name_suffix: Option<String>,
    exec_timeout: Option<String>,
    output_kind: Option<String>,
    output_endpoint: Option<String>,
    output_namespace: Option<String>,
    output_max_batch_size: Option<usize>,
    output_max_dimensions: Option<usize>,
    output_routing_tag: Option<String>,
    output_headers: Option<String>,
    output_compression: Option<String>,
    output_timeout: Option<String>,
    output_tls_ca: Option<String>,
    output_tls_cert: Option<String>,
    output_tls_key: Option<String>,
    output_tls_insecure_skip_verify: Option<bool>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TALLY_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("tally/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TallyError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TallyError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|e| TallyError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(TallyError::Config(format!(
                "bad {name} in environment: expected true or false (value={v})"
            ))),
        },
        Err(_) => Ok(None),
    }
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        interval: env::var("TALLY_INTERVAL").ok(),
        global_tags: env::var("TALLY_GLOBAL_TAGS").ok(),
        exec_command: None,
        exec_data_format: env::var("TALLY_EXEC_DATA_FORMAT").ok(),
        exec_name_suffix: env::var("TALLY_EXEC_NAME_SUFFIX").ok(),
        exec_timeout: env::var("TALLY_EXEC_TIMEOUT").ok(),
        output_kind: env::var("TALLY_OUTPUT_KIND").ok(),
        output_endpoint: env::var("TALLY_OUTPUT_ENDPOINT").ok(),
        output_namespace: env::var("TALLY_OUTPUT_NAMESPACE").ok(),
        output_max_batch_size: env_usize("TALLY_OUTPUT_MAX_BATCH_SIZE")?,
        output_max_dimensions: env_usize("TALLY_OUTPUT_MAX_DIMENSIONS")?,
        output_routing_tag: env::var("TALLY_OUTPUT_ROUTING_TAG").ok(),
        output_headers: env::var("TALLY_OUTPUT_HEADERS").ok(),
        output_compression: env::var("TALLY_OUTPUT_COMPRESSION").ok(),
        output_timeout: env::var("TALLY_OUTPUT_TIMEOUT").ok(),
        output_tls_ca: env::var("TALLY_OUTPUT_TLS_CA").ok(),
        output_tls_cert: env::var("TALLY_OUTPUT_TLS_CERT").ok(),
        output_tls_key: env::var("TALLY_OUTPUT_TLS_KEY").ok(),
        output_tls_insecure_skip_verify: env_bool("TALLY_OUTPUT_TLS_INSECURE_SKIP_VERIFY")?,
    })
}

fn parse_duration_override(field: &str, value: &str, source: &str) -> Result<Duration> {
    parse_duration_str(value)
        .map_err(|e| TallyError::Config(format!("bad {field} in {source}: {e}")))
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.interval {
        cfg.interval = parse_duration_override("interval", &v, source)?;
    }
    if let Some(v) = overrides.global_tags {
        cfg.global_tags = parse_key_value_list(&v).map_err(|e| {
            TallyError::Config(format!("bad global_tags in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.exec_command {
        cfg.exec_command = v;
    }
    if let Some(v) = overrides.exec_data_format {
        cfg.exec_data_format = v.to_ascii_lowercase();
    }
    if let Some(v) = overrides.exec_name_suffix {
        cfg.exec_name_suffix = v;
    }
    if let Some(v) = overrides.exec_timeout {
        cfg.exec_timeout = parse_duration_override("exec_timeout", &v, source)?;
    }
    if let Some(v) = overrides.output_kind {
        cfg.output_kind = v.to_ascii_lowercase();
    }
    if let Some(v) = overrides.output_endpoint {
        cfg.output_endpoint = Some(v);
    }
    if let Some(v) = overrides.output_namespace {
        cfg.output_namespace = v;
    }
    if let Some(v) = overrides.output_max_batch_size {
        cfg.output_max_batch_size = v;
    }
    if let Some(v) = overrides.output_max_dimensions {
        cfg.output_max_dimensions = v;
    }
    if let Some(v) = overrides.output_routing_tag {
        cfg.output_routing_tag = Some(v).filter(|tag| !tag.is_empty());
    }
    if let Some(v) = overrides.output_headers {
        cfg.output_headers = parse_key_value_list(&v).map_err(|e| {
            TallyError::Config(format!("bad output_headers in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.output_compression {
        cfg.output_compression = v;
    }
    if let Some(v) = overrides.output_timeout {
        cfg.output_timeout = parse_duration_override("output_timeout", &v, source)?;
    }
    if let Some(v) = overrides.output_tls_ca {
        cfg.output_tls_ca = non_empty_path(v);
    }
    if let Some(v) = overrides.output_tls_cert {
        cfg.output_tls_cert = non_empty_path(v);
    }
    if let Some(v) = overrides.output_tls_key {
        cfg.output_tls_key = non_empty_path(v);
    }
    if let Some(v) = overrides.output_tls_insecure_skip_verify {
        cfg.output_tls_insecure_skip_verify = v;
    }
    Ok(())
}

fn non_empty_path(raw: String) -> Option<PathBuf> {
    Some(raw).filter(|p| !p.is_empty()).map(PathBuf::from)
}

/// Parses `k=v,k2=v2`. Blank entries are skipped.
pub fn parse_key_value_list(raw: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(TallyError::Config(
                "entries must use key=value syntax".to_string(),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(TallyError::Config("key cannot be empty".to_string()));
        }
        out.push((key.to_string(), value.trim().to_string()));
    }
    Ok(out)
}
