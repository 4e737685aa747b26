use chrono::{DateTime, TimeZone};

/// Second-resolution stem for a capture, e.g. `2026-02-18_09-30-00`.
pub fn capture_stem<Tz: TimeZone>(captured_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    captured_at.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// File name for the `attempt`-th candidate of a stem.
///
/// The first candidate is the bare stem; later ones carry a zero-padded
/// suffix so names from the same second still sort in capture order:
/// `..._09-30-00.png`, `..._09-30-00_001.png`, `..._09-30-00_002.png`.
pub fn capture_file_name(stem: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{stem}.png")
    } else {
        format!("{stem}_{attempt:03}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn stem_format() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 18, 9, 30, 5).unwrap();
        assert_eq!(capture_stem(&ts), "2026-02-18_09-30-05");
    }

    #[test]
    fn suffixed_names_sort_after_base() {
        let mut names: Vec<String> = [2, 0, 10, 1]
            .into_iter()
            .map(|n| capture_file_name("2026-02-18_09-30-05", n))
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "2026-02-18_09-30-05.png",
                "2026-02-18_09-30-05_001.png",
                "2026-02-18_09-30-05_002.png",
                "2026-02-18_09-30-05_010.png",
            ]
        );
    }

    #[test]
    fn consecutive_seconds_sort_in_order() {
        let a = Utc.with_ymd_and_hms(2026, 2, 18, 9, 30, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 2, 18, 9, 31, 0).unwrap();
        assert!(capture_stem(&a) < capture_stem(&b));
    }
}
