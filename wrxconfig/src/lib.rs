//! # WRXServer Configuration Module
//!
//! This module provides configuration management for WRXServer, including:
//! - Loading the two configuration domains (user-facing and admin-facing)
//!   from JSON files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Persistence of the spot database (`dx.json`)
//!
//! ## Usage
//!
//! ```no_run
//! use wrxconfig::Config;
//!
//! let config = Config::load("")?;
//!
//! // Access configuration values
//! let chans = config.get_rx_channels();
//! let pwd = config.get_admin_password();
//!
//! // Update configuration values
//! config.set_value(&["chan_no_pwd"], serde_json::json!(2))?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{info, warn};
use wrxutils::guess_local_ip;

// Configurations par défaut intégrées
const DEFAULT_USER_CONFIG: &str = include_str!("config.json");
const DEFAULT_ADMIN_CONFIG: &str = include_str!("admin.json");

const ENV_CONFIG_DIR: &str = "WRX_CONFIG";
const ENV_PREFIX: &str = "WRX_CONFIG__";

const USER_FILE: &str = "config.json";
const ADMIN_FILE: &str = "admin.json";
const DX_FILE: &str = "dx.json";

// Default values for configuration
const DEFAULT_RX_CHANNELS: usize = 4;
const DEFAULT_GPS_CHANNELS: usize = 12;
const DEFAULT_CHAN_NO_PWD: usize = 0;
const DEFAULT_CLK_ADJ_PPM_LIMIT: u32 = 100;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> usize {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or($default as u64) as usize,
                Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or($default as i64) as usize,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::from(value))
        }
    };
}

/// Macro to generate getter for admin-domain bool values with default
macro_rules! impl_adm_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.adm_get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.adm_set_value($path, Value::Bool(value))
        }
    };
}

/// A persisted frequency spot record, as stored in `dx.json`.
///
/// `ident` and `notes` are kept percent-encoded, exactly as received on the
/// control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecord {
    #[serde(rename = "f")]
    pub freq: f64,
    #[serde(rename = "o")]
    pub offset: i32,
    #[serde(rename = "b")]
    pub flags: u32,
    #[serde(rename = "i")]
    pub ident: String,
    #[serde(rename = "n")]
    pub notes: String,
}

/// Static server identity fields echoed by `SET GET_CONFIG`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerIdent {
    pub serial_number: u64,
    pub public_ip: String,
    pub ext_port: u16,
    pub private_ip: String,
    pub int_port: u16,
    pub netmask_bits: u8,
    pub mac: String,
    pub version_major: u32,
    pub version_minor: u32,
}

/// Configuration manager for WRXServer
///
/// Manages the two configuration domains of the control channel:
/// the user-facing store (`config.json`) and the admin-facing store
/// (`admin.json`), each merged over an embedded default document. Also owns
/// the spot database file (`dx.json`).
///
/// Every setter persists immediately; a failed whole-document replacement
/// leaves the previous document intact.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    user_path: PathBuf,
    adm_path: PathBuf,
    dx_path: PathBuf,
    user: Mutex<Value>,
    adm: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(".wrxserver").exists() {
            return PathBuf::from(".wrxserver");
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".wrxserver");
            if home_config.exists() {
                return home_config;
            }
        }

        // Default fallback
        PathBuf::from(".wrxserver")
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        // Create if doesn't exist
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        // Verify it's a directory
        if !path.is_dir() {
            return Err(anyhow!("Le chemin spécifié n'est pas un répertoire"));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        // Test read permission
        fs::read_dir(path)?;

        Ok(())
    }

    /// Loads both configuration domains from the specified directory
    ///
    /// This method:
    /// 1. Determines and validates the configuration directory
    /// 2. Loads the embedded default documents
    /// 3. Merges them with the external `config.json` / `admin.json` if present
    /// 4. Applies environment variable overrides (user domain only)
    /// 5. Saves the merged configurations
    ///
    /// # Arguments
    ///
    /// * `directory` - The configuration directory, or empty to use the
    ///   search order (env var, current dir, home dir)
    pub fn load(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let user_path = config_dir.join(USER_FILE);
        let adm_path = config_dir.join(ADMIN_FILE);
        let dx_path = config_dir.join(DX_FILE);

        let user = Self::load_domain(&user_path, DEFAULT_USER_CONFIG, true)?;
        let adm = Self::load_domain(&adm_path, DEFAULT_ADMIN_CONFIG, false)?;

        let config = Config {
            config_dir,
            user_path,
            adm_path,
            dx_path,
            user: Mutex::new(user),
            adm: Mutex::new(adm),
        };

        // Sauvegarder les documents mergés
        config.save_user()?;
        config.save_admin()?;
        Ok(config)
    }

    fn load_domain(path: &Path, default: &str, env_overrides: bool) -> Result<Value> {
        let mut default_value: Value = serde_json::from_str(default)?;

        let json_data = if let Ok(data) = fs::read(path) {
            info!(config_file = %path.display(), "Loaded config file");
            data
        } else {
            info!(config_file = %path.display(), "Config file not found, using default embedded config");
            default.as_bytes().to_vec()
        };

        // Merger avec la config par défaut
        let external_value: Value = serde_json::from_slice(&json_data)?;
        merge_json(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        if env_overrides {
            Self::apply_env_overrides(&mut config_value);
        }

        Ok(config_value)
    }

    /// Returns the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Saves the current user-domain configuration to `config.json`
    pub fn save_user(&self) -> Result<()> {
        let data = self
            .user
            .lock()
            .map_err(|_| anyhow!("user config lock poisoned"))?;
        write_atomic(&self.user_path, &serde_json::to_string_pretty(&*data)?)
    }

    /// Saves the current admin-domain configuration to `admin.json`
    pub fn save_admin(&self) -> Result<()> {
        let data = self
            .adm
            .lock()
            .map_err(|_| anyhow!("admin config lock poisoned"))?;
        write_atomic(&self.adm_path, &serde_json::to_string_pretty(&*data)?)
    }

    /// Sets a user-domain value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["ident", "mac"]`)
    /// * `value` - The JSON value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self
                .user
                .lock()
                .map_err(|_| anyhow!("user config lock poisoned"))?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save_user()
    }

    /// Gets a user-domain value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self
            .user
            .lock()
            .map_err(|_| anyhow!("user config lock poisoned"))?;
        Self::get_value_internal(&data, path)
    }

    /// Sets an admin-domain value at the specified path and saves it
    pub fn adm_set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self
                .adm
                .lock()
                .map_err(|_| anyhow!("admin config lock poisoned"))?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save_admin()
    }

    /// Gets an admin-domain value at the specified path
    pub fn adm_get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self
            .adm
            .lock()
            .map_err(|_| anyhow!("admin config lock poisoned"))?;
        Self::get_value_internal(&data, path)
    }

    /// Replaces the whole user-domain document from a decoded JSON string
    ///
    /// Used by the control channel's full-config persistence command. The
    /// document must be a JSON object; a parse failure returns an error and
    /// leaves the previous document intact (no partial commit).
    pub fn replace_user(&self, json: &str) -> Result<()> {
        let value = Self::parse_document(json)?;
        {
            let mut data = self
                .user
                .lock()
                .map_err(|_| anyhow!("user config lock poisoned"))?;
            *data = value;
        }
        self.save_user()
    }

    /// Replaces the whole admin-domain document from a decoded JSON string
    pub fn replace_admin(&self, json: &str) -> Result<()> {
        let value = Self::parse_document(json)?;
        {
            let mut data = self
                .adm
                .lock()
                .map_err(|_| anyhow!("admin config lock poisoned"))?;
            *data = value;
        }
        self.save_admin()
    }

    fn parse_document(json: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(anyhow!("Configuration document must be a JSON object"));
        }
        Ok(Self::lower_keys_value(value))
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Object(map) = data {
            let key = path[0].to_lowercase();
            if path.len() == 1 {
                map.insert(key, value);
            } else {
                let entry = map.entry(key).or_insert(Value::Object(Map::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not an object"))
        }
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Object(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&key) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not an object", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let json_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, json_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_json::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut new_map = Map::new();
                for (k, v) in map {
                    new_map.insert(k.to_lowercase(), Self::lower_keys_value(v));
                }
                Value::Object(new_map)
            }
            Value::Array(seq) => {
                Value::Array(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    // ------------------------------------------------------------------
    // Typed getters, user domain
    // ------------------------------------------------------------------

    impl_usize_config!(
        get_rx_channels,
        set_rx_channels,
        &["rx_channels"],
        DEFAULT_RX_CHANNELS
    );

    impl_usize_config!(
        get_gps_channels,
        set_gps_channels,
        &["gps_channels"],
        DEFAULT_GPS_CHANNELS
    );

    impl_usize_config!(
        get_chan_no_pwd,
        set_chan_no_pwd,
        &["chan_no_pwd"],
        DEFAULT_CHAN_NO_PWD
    );

    /// Gets the status message shown to connected users
    pub fn get_status_msg(&self) -> String {
        match self.get_value(&["status_msg"]) {
            Ok(Value::String(s)) => s,
            _ => String::new(),
        }
    }

    /// Gets the manual clock adjustment limit, in PPM
    pub fn get_clk_adj_ppm_limit(&self) -> u32 {
        match self.get_value(&["clk_adj_ppm_limit"]) {
            Ok(Value::Number(n)) if n.is_u64() => {
                n.as_u64().unwrap_or(DEFAULT_CLK_ADJ_PPM_LIMIT as u64) as u32
            }
            _ => DEFAULT_CLK_ADJ_PPM_LIMIT,
        }
    }

    /// Gets the configured timezone identifier (e.g. "Europe/Paris")
    pub fn get_tz_id(&self) -> String {
        match self.get_value(&["timezone", "id"]) {
            Ok(Value::String(s)) => s,
            _ => "UTC".to_string(),
        }
    }

    /// Gets the configured timezone display name
    pub fn get_tz_name(&self) -> String {
        match self.get_value(&["timezone", "name"]) {
            Ok(Value::String(s)) => s,
            _ => "Coordinated Universal Time".to_string(),
        }
    }

    /// Gets the server's externally routable address
    ///
    /// Returns the configured public IP, or attempts to guess the local IP
    /// address if not configured.
    pub fn get_public_ip(&self) -> String {
        match self.get_value(&["ident", "public_ip"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                warn!("Public IP is not configured, guessing local address");
                guess_local_ip()
            }
        }
    }

    /// Gets the static server identity echoed by `SET GET_CONFIG`
    pub fn get_server_ident(&self) -> ServerIdent {
        let get_str = |path: &[&str]| match self.get_value(path) {
            Ok(Value::String(s)) => s,
            _ => String::new(),
        };
        let get_u64 = |path: &[&str], default: u64| match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            _ => default,
        };

        ServerIdent {
            serial_number: get_u64(&["ident", "serial_number"], 0),
            public_ip: self.get_public_ip(),
            ext_port: get_u64(&["ident", "ext_port"], 8073) as u16,
            private_ip: get_str(&["ident", "private_ip"]),
            int_port: get_u64(&["ident", "int_port"], 8073) as u16,
            netmask_bits: get_u64(&["ident", "netmask_bits"], 24) as u8,
            mac: get_str(&["ident", "mac"]),
            version_major: get_u64(&["ident", "version_major"], 1) as u32,
            version_minor: get_u64(&["ident", "version_minor"], 0) as u32,
        }
    }

    // ------------------------------------------------------------------
    // Typed getters, admin domain
    // ------------------------------------------------------------------

    /// Gets the viewer password, `None` when unset or empty
    pub fn get_user_password(&self) -> Option<String> {
        match self.adm_get_value(&["user_password"]) {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Gets the admin password, `None` when unset or empty
    pub fn get_admin_password(&self) -> Option<String> {
        match self.adm_get_value(&["admin_password"]) {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    impl_adm_bool_config!(
        get_user_auto_login,
        set_user_auto_login,
        &["user_auto_login"],
        false
    );

    impl_adm_bool_config!(
        get_admin_auto_login,
        set_admin_auto_login,
        &["admin_auto_login"],
        false
    );

    // ------------------------------------------------------------------
    // Spot database persistence
    // ------------------------------------------------------------------

    /// Persists the spot database to `dx.json`
    ///
    /// The write is atomic (temp file then rename) so that a failed save
    /// never truncates the previous database.
    pub fn save_spots(&self, spots: &[SpotRecord]) -> Result<()> {
        write_atomic(&self.dx_path, &serde_json::to_string_pretty(spots)?)
    }

    /// Loads the spot database from `dx.json`
    ///
    /// A missing file is an empty database, not an error.
    pub fn load_spots(&self) -> Result<Vec<SpotRecord>> {
        if !self.dx_path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.dx_path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Écriture atomique : fichier temporaire puis rename
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Merges external JSON configuration into default configuration
///
/// This function recursively merges two JSON value trees:
/// - For objects, it merges keys from external into default
/// - For scalars and arrays, external values replace default values
fn merge_json(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Object(dmap), Value::Object(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_json(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou tableaux, on remplace
    }
}
