use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;

/// Top-level harness configuration, loaded from vkt.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub harness: HarnessOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Application name reported to the driver
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Requested Vulkan API version, "major.minor"
    #[serde(default)]
    pub api_version: ApiVersion,
    /// Enable VK_LAYER_KHRONOS_validation when it is installed
    #[serde(default)]
    pub validation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Physical device index (None = first device with a graphics queue)
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessOptions {
    /// Track image layouts while recording and reject inconsistent barriers
    #[serde(default)]
    pub strict_layouts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory that receives rt.ppm / tex.ppm
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

/// A Vulkan API version without patch level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const V1_0: ApiVersion = ApiVersion { major: 1, minor: 0 };
    pub const V1_1: ApiVersion = ApiVersion { major: 1, minor: 1 };
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::V1_1
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidApiVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        if major == 0 {
            return Err(invalid());
        }
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(value: ApiVersion) -> Self {
        value.to_string()
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            api_version: ApiVersion::default(),
            validation: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let config: HarnessConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path).map_err(|e| CoreError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Reject values that parse but cannot describe a usable run.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.instance.app_name.is_empty() {
            return Err(CoreError::ConfigError("instance.app_name must not be empty".to_string()));
        }
        if self.instance.app_name.contains('\0') {
            return Err(CoreError::ConfigError(
                "instance.app_name must not contain NUL bytes".to_string(),
            ));
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err(CoreError::ConfigError("output.dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Returns the default config file path based on platform conventions.
/// Search order:
/// 1. System-wide config: `%PROGRAMDATA%\VKT\vkt.toml` (Windows) or `/etc/vkt/vkt.toml` (Linux/macOS)
/// 2. Local fallback: `./vkt.toml`
pub fn default_config_path() -> PathBuf {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let system_path = PathBuf::from(format!(r"{}\VKT\vkt.toml", programdata));
        if system_path.exists() {
            return system_path;
        }
    }
    #[cfg(not(windows))]
    {
        let system_path = Path::new("/etc/vkt/vkt.toml");
        if system_path.exists() {
            return system_path.to_path_buf();
        }
    }
    PathBuf::from("vkt.toml")
}

fn default_app_name() -> String {
    "vkt".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();
        assert_eq!(config.instance.app_name, "vkt");
        assert_eq!(config.instance.api_version, ApiVersion::V1_1);
        assert!(!config.instance.validation);
        assert_eq!(config.device.index, None);
        assert!(!config.harness.strict_layouts);
        assert_eq!(config.output.dir, PathBuf::from("."));
    }

    #[test]
    fn sections_override_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
            [instance]
            app_name = "msaa"
            api_version = "1.0"
            validation = true

            [device]
            index = 1

            [harness]
            strict_layouts = true

            [output]
            dir = "out"
            "#,
        )
        .unwrap();
        assert_eq!(config.instance.app_name, "msaa");
        assert_eq!(config.instance.api_version, ApiVersion::V1_0);
        assert!(config.instance.validation);
        assert_eq!(config.device.index, Some(1));
        assert!(config.harness.strict_layouts);
        assert_eq!(config.output.dir, PathBuf::from("out"));
    }

    #[test]
    fn malformed_api_version_is_rejected() {
        let err = HarnessConfig::from_toml("[instance]\napi_version = \"one\"\n").unwrap_err();
        assert!(matches!(err, CoreError::Toml(_)), "got {err:?}");
        assert!("1".parse::<ApiVersion>().is_err());
        assert!("0.9".parse::<ApiVersion>().is_err());
        assert_eq!("1.3".parse::<ApiVersion>().unwrap(), ApiVersion { major: 1, minor: 3 });
    }

    #[test]
    fn api_version_serializes_as_string() {
        let text = toml::to_string(&HarnessConfig::default()).unwrap();
        assert!(text.contains("api_version = \"1.1\""), "{text}");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = HarnessConfig::load_or_default("/nonexistent/vkt.toml").unwrap();
        assert_eq!(config.instance.app_name, "vkt");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let path = std::env::temp_dir().join(format!("vkt-malformed-{}.toml", std::process::id()));
        std::fs::write(&path, "[instance\napp_name = ").unwrap();
        let err = HarnessConfig::load_or_default(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        match err {
            CoreError::ConfigError(msg) => assert!(msg.contains("vkt-malformed"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_values_are_rejected() {
        let err = HarnessConfig::from_toml("[instance]\napp_name = \"\"\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)), "got {err:?}");
        let err = HarnessConfig::from_toml("[output]\ndir = \"\"\n").unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)), "got {err:?}");
    }
}
