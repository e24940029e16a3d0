//! Excel serial date conversions (1900 date system).

/// Convert a serial date to an ISO 8601 string.
///
/// Returns `YYYY-MM-DD` for whole days and `YYYY-MM-DDTHH:MM:SS` otherwise.
pub fn serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }

    // Excel counts 1900-02-29 (serial 60), which never existed.
    let adjusted = if serial > 60.0 { serial - 1.0 } else { serial };
    let (year, month, day) = days_to_ymd(adjusted.floor() as i64)?;

    let total_seconds = (serial.fract() * 86400.0).round() as u32;
    if total_seconds == 0 {
        return Some(format!("{year:04}-{month:02}-{day:02}"));
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    Some(format!(
        "{year:04}-{month:02}-{day:02}T{hours:02}:{minutes:02}:{seconds:02}"
    ))
}

/// Convert an ISO 8601 date or date-time (as stored in `t="d"` cells) to a serial.
pub fn iso_to_serial(iso: &str) -> Option<f64> {
    let iso = iso.trim().trim_end_matches('Z');
    let (date, time) = match iso.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (iso, None),
    };

    let mut parts = date.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }

    let mut days = ymd_to_days(year, month, day)?;
    if days >= 60 {
        days += 1;
    }

    let fraction = match time {
        Some(t) => {
            let mut fields = t.splitn(3, ':');
            let h: f64 = fields.next()?.parse().ok()?;
            let m: f64 = fields.next().unwrap_or("0").parse().ok()?;
            let s: f64 = fields.next().unwrap_or("0").parse().ok()?;
            (h * 3600.0 + m * 60.0 + s) / 86400.0
        }
        None => 0.0,
    };
    Some(days as f64 + fraction)
}

/// Convert days since 1899-12-31 to year, month, day.
fn days_to_ymd(days: i64) -> Option<(i32, u32, u32)> {
    if days < 1 {
        return None;
    }

    let mut year = 1900;
    let mut remaining = days;
    loop {
        let in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining <= in_year {
            break;
        }
        remaining -= in_year;
        year += 1;
        if year > 9999 {
            return None;
        }
    }

    let mut month = 1u32;
    while month < 12 {
        let in_month = days_in_month(year, month) as i64;
        if remaining <= in_month {
            break;
        }
        remaining -= in_month;
        month += 1;
    }
    Some((year, month, remaining as u32))
}

fn ymd_to_days(year: i32, month: u32, day: u32) -> Option<i64> {
    if year < 1900 {
        return None;
    }
    let mut days: i64 = (1900..year)
        .map(|y| if is_leap_year(y) { 366 } else { 365 })
        .sum();
    for m in 1..month {
        days += days_in_month(year, m) as i64;
    }
    Some(days + day as i64)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_to_iso() {
        assert_eq!(serial_to_iso(1.0).as_deref(), Some("1900-01-01"));
        assert_eq!(serial_to_iso(61.0).as_deref(), Some("1900-03-01"));
        assert_eq!(serial_to_iso(45000.0).as_deref(), Some("2023-03-15"));
        assert_eq!(serial_to_iso(45000.5).as_deref(), Some("2023-03-15T12:00:00"));
        assert_eq!(serial_to_iso(0.0), None);
        assert_eq!(serial_to_iso(f64::NAN), None);
    }

    #[test]
    fn test_iso_to_serial() {
        assert_eq!(iso_to_serial("1900-01-01"), Some(1.0));
        assert_eq!(iso_to_serial("1900-03-01"), Some(61.0));
        assert_eq!(iso_to_serial("2023-03-15"), Some(45000.0));
        assert_eq!(iso_to_serial("2023-03-15T06:00:00Z"), Some(45000.25));
        assert_eq!(iso_to_serial("2023-02-30"), None);
        assert_eq!(iso_to_serial("yesterday"), None);
    }
}
