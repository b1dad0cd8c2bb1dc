//! Maps a raw level estimate to what the display shows.

use serde::{Deserialize, Serialize};

/// Level (in display dB) at or above which the meter warns.
pub const WARN_THRESHOLD: f32 = 80.0;

/// Severity band of a clamped level. Thresholds are fixed at 50 and 80,
/// inclusive on the upper side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    Quiet,
    Moderate,
    Loud,
}

/// Everything a presenter needs for one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Raw estimate clamped into [0, 100]
    pub clamped_level: f32,
    /// Bar fill fraction, clamped_level / 100
    pub progress: f32,
    pub band: Band,
    /// Display color as #RRGGBB
    pub color: &'static str,
    pub message: &'static str,
    /// Present only at or above `WARN_THRESHOLD`
    pub warning: Option<String>,
}

/// Pure and total. Any float in, a complete display reading out.
pub fn classify(level: f32) -> Classification {
    let clamped_level = level.clamp(0.0, 100.0);
    let progress = clamped_level / 100.0;

    let (band, color, message) = if clamped_level < 50.0 {
        (Band::Quiet, "#4CAF50", "Quiet • Safe")
    } else if clamped_level < WARN_THRESHOLD {
        (Band::Moderate, "#FFC107", "Moderate • Be mindful")
    } else {
        (Band::Loud, "#F44336", "Too Loud! • Turn it down")
    };

    let warning = (clamped_level >= WARN_THRESHOLD)
        .then(|| format!("Noise level exceeds {WARN_THRESHOLD:.0} dB!"));

    Classification {
        clamped_level,
        progress,
        band,
        color,
        message,
        warning,
    }
}
