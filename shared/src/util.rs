/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format an integer amount of minor units (cents) as `units.cents`.
///
/// Amounts never pass through floating point.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minor_units() {
        assert_eq!(format_minor_units(500000), "5000.00");
        assert_eq!(format_minor_units(100561), "1005.61");
        assert_eq!(format_minor_units(7), "0.07");
        assert_eq!(format_minor_units(0), "0.00");
        assert_eq!(format_minor_units(-1250), "-12.50");
    }
}
