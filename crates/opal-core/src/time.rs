//! Wall-Clock Helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, truncated to the 32-bit field the wire
/// protocol carries
pub fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_seconds_is_current() {
        // 2020-01-01T00:00:00Z
        assert!(unix_seconds() > 1_577_836_800);
    }
}
