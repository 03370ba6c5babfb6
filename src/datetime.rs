/*
 * mailbox - datetime module.
 *
 * Copyright 2024 Manos Pitsidianakis
 *
 * This file is part of mailbox.
 *
 * mailbox is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailbox is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailbox. If not, see <http://www.gnu.org/licenses/>.
 */

//! Minimal RFC 822/5322 `Date:` parsing and rendering, without pulling in a
//! calendar crate — the days-since-epoch civil calendar math below is the
//! standard Howard Hinnant algorithm.

pub type UnixTimestamp = i64;

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn now() -> UnixTimestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64; // [0, 399]
    let mp = (m + 9) % 12; // [0, 11]
    let doy = (153 * mp + 2) / 5 + d - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146097 + doe - 719468
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

pub fn timestamp_to_rfc822(ts: UnixTimestamp) -> String {
    let days = ts.div_euclid(86_400);
    let secs_of_day = ts.rem_euclid(86_400);
    let (y, m, d) = civil_from_days(days);
    let weekday = ((days % 7 + 11) % 7) as usize; // 1970-01-01 was a Thursday
    let hh = secs_of_day / 3600;
    let mm = (secs_of_day % 3600) / 60;
    let ss = secs_of_day % 60;
    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} +0000",
        DAY_NAMES[weekday],
        d,
        MONTH_NAMES[(m - 1) as usize],
        y,
        hh,
        mm,
        ss
    )
}

/// Best-effort parser for RFC 822/2822/5322 `Date:` field bodies. Tolerant
/// of a leading day-of-week and of comments having already been stripped by
/// the caller (see `field::strip_cfws`).
pub fn parse_rfc822_date(input: &str) -> Option<UnixTimestamp> {
    let s = input.trim();
    // Drop an optional leading "Mon, " day-of-week token.
    let s = match s.find(',') {
        Some(idx) if idx <= 4 => s[idx + 1..].trim_start(),
        _ => s,
    };
    let mut parts = s.split_whitespace();
    let day: i64 = parts.next()?.parse().ok()?;
    let month_str = parts.next()?;
    let month = MONTH_NAMES
        .iter()
        .position(|m| m.eq_ignore_ascii_case(&month_str[..month_str.len().min(3)]))? as i64
        + 1;
    let year_str = parts.next()?;
    let mut year: i64 = year_str.parse().ok()?;
    if year < 100 {
        year += if year < 50 { 2000 } else { 1900 };
    }
    let time_str = parts.next()?;
    let mut time_parts = time_str.splitn(3, ':');
    let hh: i64 = time_parts.next()?.parse().ok()?;
    let mm: i64 = time_parts.next()?.parse().ok()?;
    let ss: i64 = time_parts.next().unwrap_or("0").parse().ok()?;

    let mut offset_secs: i64 = 0;
    if let Some(tz) = parts.next() {
        offset_secs = parse_zone(tz).unwrap_or(0);
    }

    let days = days_from_civil(year, month, day);
    Some(days * 86_400 + hh * 3600 + mm * 60 + ss - offset_secs)
}

fn parse_zone(tz: &str) -> Option<i64> {
    if let Some(sign) = tz.chars().next() {
        if sign == '+' || sign == '-' {
            if tz.len() == 5 {
                let hh: i64 = tz[1..3].parse().ok()?;
                let mm: i64 = tz[3..5].parse().ok()?;
                let total = hh * 3600 + mm * 60;
                return Some(if sign == '-' { -total } else { total });
            }
        }
    }
    match tz.to_ascii_uppercase().as_str() {
        "UT" | "GMT" | "Z" => Some(0),
        "EST" => Some(-5 * 3600),
        "EDT" => Some(-4 * 3600),
        "CST" => Some(-6 * 3600),
        "CDT" => Some(-5 * 3600),
        "MST" => Some(-7 * 3600),
        "MDT" => Some(-6 * 3600),
        "PST" => Some(-8 * 3600),
        "PDT" => Some(-7 * 3600),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_epoch() {
        let rendered = timestamp_to_rfc822(0);
        assert_eq!(rendered, "Thu, 01 Jan 1970 00:00:00 +0000");
        assert_eq!(parse_rfc822_date(&rendered), Some(0));
    }

    #[test]
    fn parses_numeric_offset() {
        let ts = parse_rfc822_date("Mon, 15 Jan 2024 10:00:00 +0200").unwrap();
        // 10:00 +0200 is 08:00 UTC.
        assert_eq!(ts % 86_400, 8 * 3600);
    }

    #[test]
    fn tolerates_two_digit_year_and_named_zone() {
        let ts = parse_rfc822_date("1 Jan 99 00:00:00 GMT").unwrap();
        let (y, _, _) = civil_from_days(ts.div_euclid(86_400));
        assert_eq!(y, 1999);
    }
}
