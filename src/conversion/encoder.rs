//! Encoder process invocation.
//!
//! Builds the ffmpeg argument vector for a conversion job and spawns the
//! process with its progress stream piped. The encoder contract: input and
//! output paths, line-oriented `key=value` progress on stdout, exit code
//! zero only on success, terminable by signal.

use crate::quality::QualitySetting;
use crate::state::ConversionJob;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// External tool configuration shared by all workers.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: PathBuf,
    /// Path to the exiftool binary used for the metadata-copy step.
    pub exiftool_path: PathBuf,
    /// Whether to run the metadata-copy step after a successful encode.
    pub copy_metadata: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            exiftool_path: PathBuf::from("exiftool"),
            copy_metadata: true,
        }
    }
}

/// Build the ffmpeg argument vector for a job.
pub fn build_encode_args(job: &ConversionJob, quality: &QualitySetting) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        // Progress stream on stdout, one key=value pair per line.
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-i".to_string(),
        job.input_path.to_string_lossy().to_string(),
    ];

    if job.mute {
        args.push("-an".to_string());
    }

    if job.reverse {
        args.extend(["-vf".to_string(), "reverse".to_string()]);
        if !job.mute {
            args.extend(["-af".to_string(), "areverse".to_string()]);
        }
    }

    args.extend([
        "-preset".to_string(),
        quality.preset.to_string(),
        "-crf".to_string(),
        quality.crf.to_string(),
    ]);

    // Faststart for streamable containers.
    if matches!(job.format.as_str(), "mp4" | "mov") {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    args.push(job.output_path.to_string_lossy().to_string());
    args
}

/// Spawn the encoder for a job with stdout piped for progress extraction.
pub fn spawn_encoder(
    settings: &EncoderSettings,
    job: &ConversionJob,
    quality: &QualitySetting,
) -> io::Result<Child> {
    let args = build_encode_args(job, quality);
    tracing::debug!(conversion_id = %job.id, "Encoder args: {:?}", args);

    Command::new(&settings.ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
}

/// Copy tags from the input to the finished output. Best effort: the caller
/// logs a failure and moves on, it never fails the conversion.
pub async fn copy_metadata(
    settings: &EncoderSettings,
    input: &Path,
    output: &Path,
) -> io::Result<()> {
    let status = Command::new(&settings.exiftool_path)
        .arg("-TagsFromFile")
        .arg(input)
        .arg("-all:all")
        .arg("-overwrite_original")
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "exiftool exited with status {status}"
        )))
    }
}

/// Availability of one external tool.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: &'static str,
    pub available: bool,
    pub path: Option<PathBuf>,
}

/// Check that the configured external tools can be found.
pub fn check_tools(settings: &EncoderSettings) -> Vec<ToolStatus> {
    [
        ("ffmpeg", &settings.ffmpeg_path),
        ("exiftool", &settings.exiftool_path),
    ]
    .into_iter()
    .map(|(name, configured)| {
        let path = which::which(configured).ok();
        ToolStatus {
            name,
            available: path.is_some(),
            path,
        }
    })
    .collect()
}
