//! Peak amplitude to decibel-like level estimation.

/// Full-scale reference for signed 16-bit samples.
const FULL_SCALE: f32 = 32767.0;

/// Shifts typical ambient/conversational peaks into a friendly 0..100
/// display range. Rough offset, not an SPL calibration.
const DISPLAY_OFFSET: f32 = 90.0;

/// Estimate a display level in dB from one frame of samples.
///
/// Returns exactly `0.0` for an all-zero frame (silence floor, avoids
/// log10(0) going to -inf), otherwise `20 * log10(peak / 32767) + 90`.
/// No clamping happens here, very quiet frames can come out negative and
/// the classifier deals with that.
pub fn estimate(frame: &[i16]) -> f32 {
    // unsigned_abs so i16::MIN cannot overflow; the one count above full
    // scale is capped so the ratio never exceeds 1.0
    let peak = frame
        .iter()
        .map(|&s| s.unsigned_abs().min(32767))
        .max()
        .unwrap_or(0);

    if peak == 0 {
        return 0.0;
    }

    20.0 * (peak as f32 / FULL_SCALE).log10() + DISPLAY_OFFSET
}
