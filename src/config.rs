use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: top-level value must be an object", path.display())]
    NotObject { path: PathBuf },
    #[error("invalid {key}: {why}")]
    Invalid { key: &'static str, why: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    pub mode: String,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: crate::port::AUTO.into(),
            baud: 115_200,
            mode: "PreSolve".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    pub profile: Option<String>,
    pub pid_kp: f64,
    pub pid_ki: f64,
    pub pid_kd: f64,
    /// Control loop rate; the PID `dt` is its inverse
    pub sample_hz: f64,
    pub max_output: Option<f64>,
    pub integral_limit: Option<f64>,
    /// Per-axis error magnitude (pixels) at or below which the axis is held
    pub deadzone_radius: f64,
    /// Output is scaled by `1 - smoothing`
    pub aim_smoothing: f64,
    pub target_lock_strength: f64,
    /// Fraction of frame height added to the target's y before comparing
    pub shooting_height_offset: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub loop_pause_ms: u64,
    pub serial: SerialSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: None,
            pid_kp: 0.2,
            pid_ki: 0.0,
            pid_kd: 0.0,
            sample_hz: 60.0,
            max_output: None,
            integral_limit: None,
            deadzone_radius: 0.0,
            aim_smoothing: 0.0,
            target_lock_strength: 1.0,
            shooting_height_offset: 0.0,
            frame_width: 1920,
            frame_height: 1080,
            loop_pause_ms: 1,
            serial: SerialSettings::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let profiles = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("profiles");
        Self::load_with_profiles(path, &profiles)
    }

    /// `PROFILE` names `<profiles>/<PROFILE>.json`; its top-level keys replace
    /// the base ones. A missing profile is ignored.
    pub fn load_with_profiles(path: &Path, profiles: &Path) -> Result<Self, ConfigError> {
        let mut merged = read_object(path)?;
        let profile = merged
            .get("PROFILE")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if let Some(name) = profile {
            let profile_path = profiles.join(format!("{}.json", name));
            match read_object(&profile_path) {
                Ok(overlay) => merged.extend(overlay),
                Err(e) => eprintln!("[config] profile {} ignored: {}", name, e),
            }
        }
        let settings: Settings =
            serde_json::from_value(Value::Object(merged)).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn bad(key: &'static str, why: String) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { key, why })
        }
        if !(self.sample_hz.is_finite() && self.sample_hz > 0.0) {
            return bad("SAMPLE_HZ", format!("{} must be > 0", self.sample_hz));
        }
        if !(0.0..=1.0).contains(&self.aim_smoothing) {
            return bad(
                "AIM_SMOOTHING",
                format!("{} not in [0, 1]", self.aim_smoothing),
            );
        }
        if self.deadzone_radius < 0.0 {
            return bad(
                "DEADZONE_RADIUS",
                format!("{} must be >= 0", self.deadzone_radius),
            );
        }
        if let Some(m) = self.max_output
            && m <= 0.0
        {
            return bad("MAX_OUTPUT", format!("{} must be > 0", m));
        }
        if let Some(l) = self.integral_limit
            && l <= 0.0
        {
            return bad("INTEGRAL_LIMIT", format!("{} must be > 0", l));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return bad(
                "FRAME_WIDTH/FRAME_HEIGHT",
                format!("{}x{} is empty", self.frame_width, self.frame_height),
            );
        }
        Ok(())
    }

    pub fn dt(&self) -> f64 {
        1.0 / self.sample_hz
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotObject {
            path: path.to_path_buf(),
        }),
    }
}
