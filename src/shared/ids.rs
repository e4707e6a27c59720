use chrono::{DateTime, Utc};
use getrandom::getrandom;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

/// Session ids embed the UTC start time so on-disk session directories sort
/// chronologically; the random suffix keeps ids unique within one second.
pub fn generate_session_id(now: i64) -> Result<String, String> {
    let timestamp = DateTime::<Utc>::from_timestamp(now, 0)
        .ok_or_else(|| format!("session id requires a valid timestamp, got {now}"))?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes)
        .map_err(|err| format!("session id randomness unavailable: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % SUFFIX_SPACE;
    Ok(format!(
        "{}-{}",
        timestamp.format("%Y%m%d_%H%M%S"),
        base36_encode_fixed_u32(sample, 4)
    ))
}

pub fn is_valid_session_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
