//! Native-wide ↔ UTF-8 boundary.
//!
//! Everything persisted in shared memory is UTF-8; host-facing strings
//! arrive and leave as UTF-16 code units. Unpaired surrogates are replaced
//! on the way in — a path containing them cannot name a real host entry
//! anyway.

/// Decode UTF-16 code units, stopping at the first NUL.
pub fn from_wide(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Encode to NUL-terminated UTF-16.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
