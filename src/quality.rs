//! Encode quality presets.
//!
//! Maps a user-facing quality name to the encoder preset speed and constant
//! rate factor passed to ffmpeg. Lookup is forgiving: names are trimmed and
//! matched case-insensitively, and anything unrecognized falls back to the
//! default preset so a conversion can never fail on quality selection alone.

use serde::Serialize;

/// A named encode quality: encoder preset speed plus CRF value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualitySetting {
    /// User-facing name (lowercase).
    pub name: &'static str,
    /// ffmpeg `-preset` value.
    pub preset: &'static str,
    /// ffmpeg `-crf` value. Lower means higher quality.
    pub crf: u8,
}

/// All quality settings, in presentation order.
const QUALITY_SETTINGS: [QualitySetting; 4] = [
    QualitySetting {
        name: "fast",
        preset: "veryfast",
        crf: 28,
    },
    QualitySetting {
        name: "balanced",
        preset: "medium",
        crf: 23,
    },
    QualitySetting {
        name: "high",
        preset: "slow",
        crf: 18,
    },
    QualitySetting {
        name: "best",
        preset: "veryslow",
        crf: 15,
    },
];

/// Index of the default setting within [`QUALITY_SETTINGS`].
const DEFAULT_INDEX: usize = 1;

/// Resolve a quality name to its setting.
///
/// Trims whitespace and ignores case. Unknown or empty names resolve to the
/// default ("balanced") preset, so this never fails.
pub fn resolve_quality_setting(name: &str) -> &'static QualitySetting {
    let normalized = name.trim().to_ascii_lowercase();
    QUALITY_SETTINGS
        .iter()
        .find(|q| q.name == normalized)
        .unwrap_or(&QUALITY_SETTINGS[DEFAULT_INDEX])
}

/// Whether a name (after trimming and case folding) matches a known setting.
pub fn is_valid_quality_name(name: &str) -> bool {
    let normalized = name.trim().to_ascii_lowercase();
    QUALITY_SETTINGS.iter().any(|q| q.name == normalized)
}

/// All quality settings in a stable, fixed order for presentation.
pub fn available_quality_settings() -> &'static [QualitySetting] {
    &QUALITY_SETTINGS
}
