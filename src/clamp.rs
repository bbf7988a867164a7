/// Saturate to the signed 16-bit range used by relative deltas and bias.
pub fn sat_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Saturate an absolute coordinate to `[0, 32767]`.
pub fn sat_coord(v: i64) -> i16 {
    v.clamp(0, i16::MAX as i64) as i16
}

/// Keep the low 16 bits of a button mask.
pub fn mask_buttons(v: u32) -> u16 {
    (v & 0xFFFF) as u16
}

/// Clamp a float to `[-limit, limit]`. `limit` must not be NaN.
pub fn sym(v: f64, limit: f64) -> f64 {
    v.clamp(-limit, limit)
}
