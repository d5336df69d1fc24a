const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Human readable size in binary units, with one decimal.
///
/// ```
/// assert_eq!(duet_sync::format_size(393_495_974), "375.3 MiB");
/// assert_eq!(duet_sync::format_size(512), "512 B");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    // 1023.95 and up would print as "1024.0"
    if (value * 10.0).round() >= 10240.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 B")]
    #[case(512, "512 B")]
    #[case(1024, "1.0 KiB")]
    #[case(1500, "1.5 KiB")]
    #[case(1480, "1.4 KiB")]
    #[case(2000, "2.0 KiB")]
    #[case(1_048_575, "1.0 MiB")]
    #[case(1_048_576, "1.0 MiB")]
    #[case(1_073_741_823, "1.0 GiB")]
    #[case(1_073_741_824, "1.0 GiB")]
    #[case(393_495_974, "375.3 MiB")]
    fn test_format_size(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }
}
