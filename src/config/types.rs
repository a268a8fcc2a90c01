use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Conversion pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionConfig {
    /// Number of concurrent conversion workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory holding uploaded source files
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// Directory receiving finished conversions
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// ffmpeg binary (name resolved via PATH, or an absolute path)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// exiftool binary for the metadata-copy step
    #[serde(default = "default_exiftool_path")]
    pub exiftool_path: PathBuf,
    /// Copy source metadata tags onto finished outputs
    #[serde(default = "default_copy_metadata")]
    pub copy_metadata: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            uploads_dir: default_uploads_dir(),
            output_dir: default_output_dir(),
            ffmpeg_path: default_ffmpeg_path(),
            exiftool_path: default_exiftool_path(),
            copy_metadata: default_copy_metadata(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_workers() -> usize {
    2
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./converted")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_exiftool_path() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_copy_metadata() -> bool {
    true
}
