//! Timestamp formatting shared by transcripts, metadata and ids.

use chrono::{DateTime, Local};

/// Format of every stored timestamp (`YYYY-MM-DD HH:MM:SS.ffffff`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format of the timestamp part of a conversation id.
pub const ID_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
#[must_use]
pub fn now_stamp() -> String {
    format_stamp(&Local::now())
}

/// Current local time in [`ID_FORMAT`].
#[must_use]
pub fn id_stamp() -> String {
    Local::now().format(ID_FORMAT).to_string()
}

/// Format a point in time in [`TIMESTAMP_FORMAT`].
#[must_use]
pub fn format_stamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_shape() {
        let at = Local
            .with_ymd_and_hms(2025, 3, 9, 7, 5, 1)
            .single()
            .unwrap();
        assert_eq!(format_stamp(&at), "2025-03-09 07:05:01.000000");
    }

    #[test]
    fn test_stamps_sort_chronologically() {
        let first = now_stamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = now_stamp();
        assert!(second > first);
        assert_eq!(id_stamp().len(), "2025-03-09_07-05-01".len());
    }
}
