use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

/// A point in time read from the card, possibly only as precise as a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp<Tz: TimeZone> {
    Day(NaiveDate),
    Full(DateTime<Tz>),
}

impl<Tz> Timestamp<Tz>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    pub fn format(&self) -> String {
        match self {
            Self::Day(date) => date.format("%Y-%m-%d").to_string(),
            Self::Full(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1997, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn since_epoch(delta: Duration) -> Option<NaiveDateTime> {
    epoch()?.checked_add_signed(delta)
}

fn utc<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Tz> {
    tz.from_utc_datetime(&naive)
}

fn local<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

fn packed16(value: u32) -> Duration {
    Duration::hours((value >> 11) as i64)
        + Duration::minutes(((value >> 5) & 0x3F) as i64)
        + Duration::seconds(((value & 0x1F) * 2) as i64)
}

/// Seconds since the epoch, in UTC.
pub(crate) fn parse_time_sec<Tz: TimeZone>(seconds: u32, tz: &Tz) -> Option<DateTime<Tz>> {
    match seconds {
        0 => None,
        _ => Some(utc(since_epoch(Duration::seconds(seconds as i64))?, tz)),
    }
}

/// Seconds since the epoch, in the local time of `tz`.
pub(crate) fn parse_time_sec_local<Tz: TimeZone>(seconds: u32, tz: &Tz) -> Option<DateTime<Tz>> {
    match seconds {
        0 => None,
        _ => local(since_epoch(Duration::seconds(seconds as i64))?, tz),
    }
}

/// Days since the epoch and minutes since midnight, in UTC.
pub(crate) fn parse_time<Tz: TimeZone>(days: u32, minutes: u32, tz: &Tz) -> Option<DateTime<Tz>> {
    if days == 0 && minutes == 0 {
        return None;
    }

    let naive = since_epoch(Duration::days(days as i64) + Duration::minutes(minutes as i64))?;
    Some(utc(naive, tz))
}

/// Days since the epoch and minutes since midnight, in the local time of `tz`.
pub(crate) fn parse_time_local<Tz: TimeZone>(
    days: u32,
    minutes: u32,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    if days == 0 && minutes == 0 {
        return None;
    }

    local(
        since_epoch(Duration::days(days as i64) + Duration::minutes(minutes as i64))?,
        tz,
    )
}

/// Days since the epoch and a packed `hhhhhmmmmmmsssss` time of day, in UTC.
pub(crate) fn parse_time_packed16<Tz: TimeZone>(
    days: u32,
    time: u32,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    if days == 0 && time == 0 {
        return None;
    }

    Some(utc(since_epoch(Duration::days(days as i64) + packed16(time))?, tz))
}

/// Days since the epoch.
pub(crate) fn parse_date(days: u32) -> Option<NaiveDate> {
    match days {
        0 => None,
        _ => since_epoch(Duration::days(days as i64)).map(|t| t.date()),
    }
}

/// A packed `yyyyyyymmmmddddd` date, with years from 2000.
pub(crate) fn parse_date_packed(value: u32) -> Option<NaiveDate> {
    match value {
        0 => None,
        _ => NaiveDate::from_ymd_opt(
            (value >> 9) as i32 + 2000,
            (value >> 5) & 0x0F,
            value & 0x1F,
        ),
    }
}

/// A packed date with a packed 16-bit time of day, in the local time of `tz`.
pub(crate) fn parse_date_time_packed16_local<Tz: TimeZone>(
    date: u32,
    time: u32,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    let midnight = parse_date_packed(date)?.and_hms_opt(0, 0, 0)?;
    local(midnight.checked_add_signed(packed16(time))?, tz)
}

/// A packed date with a packed `hhhhhmmmmmm` time of day, in the local time of `tz`.
pub(crate) fn parse_date_time_packed11_local<Tz: TimeZone>(
    date: u32,
    time: u32,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(time >> 6, time & 0x3F, 0)?;
    local(parse_date_packed(date)?.and_time(time), tz)
}

fn bcd(value: u32) -> Option<u32> {
    (0..8).rev().try_fold(0, |result, nibble| {
        let digit = (value >> (nibble * 4)) & 0x0F;
        match digit {
            0..=9 => Some(result * 10 + digit),
            _ => None,
        }
    })
}

/// A BCD `YYYYMMDD` date.
pub(crate) fn parse_date_bcd(value: u32) -> Option<NaiveDate> {
    match value {
        0 => None,
        _ => NaiveDate::from_ymd_opt(
            bcd(value >> 16)? as i32,
            bcd((value >> 8) & 0xFF)?,
            bcd(value & 0xFF)?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_parse_time_sec() {
        assert_eq!(None, parse_time_sec(0, &Utc));
        assert_eq!(
            Utc.with_ymd_and_hms(1997, 1, 2, 0, 1, 1).single(),
            parse_time_sec(86_400 + 61, &Utc)
        );
    }

    #[test]
    fn test_parse_time_local_differs_from_utc() {
        let tz = FixedOffset::east_opt(3600).unwrap();

        let utc = parse_time(1, 60, &tz).unwrap();
        let local = parse_time_local(1, 60, &tz).unwrap();

        assert_eq!("1997-01-02 02:00:00", utc.format("%Y-%m-%d %H:%M:%S").to_string());
        assert_eq!("1997-01-02 01:00:00", local.format("%Y-%m-%d %H:%M:%S").to_string());
    }

    #[test]
    fn test_parse_packed() {
        // 2019-03-14
        let date = (19 << 9) | (3 << 5) | 14;

        assert_eq!(NaiveDate::from_ymd_opt(2019, 3, 14), parse_date_packed(date));
        assert_eq!(None, parse_date_packed(0));
        assert_eq!(
            Utc.with_ymd_and_hms(2019, 3, 14, 13, 45, 58).single(),
            parse_date_time_packed16_local(date, (13 << 11) | (45 << 5) | 29, &Utc)
        );
        assert_eq!(
            Utc.with_ymd_and_hms(2019, 3, 14, 7, 5, 0).single(),
            parse_date_time_packed11_local(date, (7 << 6) | 5, &Utc)
        );
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(None, parse_date(0));
        assert_eq!(NaiveDate::from_ymd_opt(1997, 2, 1), parse_date(31));
        assert_eq!(NaiveDate::from_ymd_opt(2024, 2, 29), parse_date_bcd(0x2024_0229));
        assert_eq!(None, parse_date_bcd(0x2024_0A01));
    }
}
