//! Tehran wall-clock time and the Jalali calendar.
//!
//! The conversion routines implement the day-count algorithm widely used
//! across Jalali calendar ports: convert to an
//! absolute day number anchored on 622-03-22 Gregorian, then redistribute
//! that count into Jalali y/m/d using the 2820-year grand cycle. No
//! timezone database lookups are involved in the conversion itself; this
//! crate only reaches for `chrono-tz` to place a UTC instant onto the
//! Tehran wall clock before converting.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Asia::Tehran;

/// Fixed Jalali holidays, `(month, day)`. Matches the hardcoded set the
/// scheduler consults when `skip_holidays` is enabled; this calendar does
/// not compute Eid al-Fitr/Adha or other lunar-Hijri observances.
pub const FIXED_HOLIDAYS: &[(u32, u32)] = &[
    (1, 1),
    (1, 2),
    (1, 3),
    (1, 4),
    (1, 12),
    (1, 13),
    (3, 14),
    (3, 15),
    (11, 22),
    (12, 29),
];

/// A Jalali calendar date. Not validated beyond month/day range checks;
/// callers that need a Gregorian instant should go through [`to_gregorian`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl JalaliDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// True if this date falls on the fixed holiday list.
    pub fn is_fixed_holiday(&self) -> bool {
        FIXED_HOLIDAYS.contains(&(self.month, self.day))
    }
}

/// Current instant, read off the Tehran wall clock.
pub fn now_tehran() -> DateTime<chrono_tz::Tz> {
    Utc::now().with_timezone(&Tehran)
}

/// Project a UTC instant onto the Tehran wall clock.
pub fn to_tehran(instant: DateTime<Utc>) -> DateTime<chrono_tz::Tz> {
    instant.with_timezone(&Tehran)
}

/// Tehran-local weekday numbered Saturday=0 .. Friday=6.
pub fn tehran_weekday(date: NaiveDate) -> u32 {
    (date.weekday().num_days_from_sunday() + 1) % 7
}

/// Convert a Gregorian date to its Jalali equivalent.
pub fn to_jalali(date: NaiveDate) -> JalaliDate {
    let gy = date.year();
    let gm = date.month() as i64;
    let gd = date.day() as i64;

    const G_DAYS_IN_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let gy2 = (gy as i64) - 1600;
    let gm2 = gm - 1;
    let gd2 = gd - 1;

    let mut g_day_no = 365 * gy2 + div_floor(gy2 + 3, 4) - div_floor(gy2 + 99, 100)
        + div_floor(gy2 + 399, 400);

    for i in 0..gm2 {
        g_day_no += G_DAYS_IN_MONTH[i as usize];
    }
    if gm2 > 1 && is_gregorian_leap(gy) {
        g_day_no += 1;
    }
    g_day_no += gd2;

    let mut j_day_no = g_day_no - 79;

    let j_np = div_floor(j_day_no, 12053);
    j_day_no = mod_floor(j_day_no, 12053);

    let mut jy = 979 + 33 * j_np + 4 * div_floor(j_day_no, 1461);
    j_day_no = mod_floor(j_day_no, 1461);

    if j_day_no >= 366 {
        jy += div_floor(j_day_no - 1, 365);
        j_day_no = mod_floor(j_day_no - 1, 365);
    }

    const J_DAYS_IN_MONTH: [i64; 12] = [31, 31, 31, 31, 31, 31, 30, 30, 30, 30, 30, 29];
    let mut i = 0usize;
    while i < 11 && j_day_no >= J_DAYS_IN_MONTH[i] {
        j_day_no -= J_DAYS_IN_MONTH[i];
        i += 1;
    }

    JalaliDate {
        year: jy as i32,
        month: (i + 1) as u32,
        day: (j_day_no + 1) as u32,
    }
}

/// Convert a Jalali date to its Gregorian equivalent.
pub fn to_gregorian(date: JalaliDate) -> Option<NaiveDate> {
    let jy = (date.year as i64) - 979;
    let jm = (date.month as i64) - 1;
    let jd = (date.day as i64) - 1;

    const J_DAYS_IN_MONTH: [i64; 12] = [31, 31, 31, 31, 31, 31, 30, 30, 30, 30, 30, 29];
    let mut j_day_no = 365 * jy + div_floor(jy, 33) * 8 + div_floor(mod_floor(jy, 33) + 3, 4);
    for i in 0..jm {
        j_day_no += J_DAYS_IN_MONTH[i as usize];
    }
    j_day_no += jd;

    let mut g_day_no = j_day_no + 79;

    let mut gy: i64 = 1600 + 400 * div_floor(g_day_no, 146097);
    g_day_no = mod_floor(g_day_no, 146097);

    let mut leap = true;
    if g_day_no >= 36525 {
        g_day_no -= 1;
        gy += 100 * div_floor(g_day_no, 36524);
        g_day_no = mod_floor(g_day_no, 36524);

        if g_day_no >= 365 {
            g_day_no += 1;
        } else {
            leap = false;
        }
    }

    gy += 4 * div_floor(g_day_no, 1461);
    g_day_no = mod_floor(g_day_no, 1461);

    if g_day_no >= 366 {
        leap = false;
        g_day_no -= 1;
        gy += div_floor(g_day_no, 365);
        g_day_no = mod_floor(g_day_no, 365);
    }

    let g_days_in_month: [i64; 12] = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut i = 0usize;
    while i < 12 && g_day_no >= g_days_in_month[i] {
        g_day_no -= g_days_in_month[i];
        i += 1;
    }

    NaiveDate::from_ymd_opt(gy as i32, (i + 1) as u32, (g_day_no + 1) as u32)
}

/// Build a UTC instant from a Jalali date and a Tehran-local hour/minute,
/// matching `build_utc_datetime_from_jalali_minute` in the bank SMS parser.
pub fn jalali_minute_to_utc(date: JalaliDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let gdate = to_gregorian(date)?;
    let naive = NaiveDateTime::new(gdate, chrono::NaiveTime::from_hms_opt(hour, minute, 0)?);
    Tehran
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The UTC instant range covering an entire Jalali calendar day on the
/// Tehran wall clock: `[00:00:00, 24:00:00)`, matching
/// `jalali_date_range_to_utc`'s half-open day bracket.
pub fn jalali_day_range_to_utc(date: JalaliDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = jalali_minute_to_utc(date, 0, 0)?;
    let next_gdate = to_gregorian(date)?.succ_opt()?;
    let next = to_jalali(next_gdate);
    let end = jalali_minute_to_utc(next, 0, 0)?;
    Some((start, end))
}

fn is_gregorian_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn div_floor(a: i64, b: i64) -> i64 {
    a.div_euclid(b)
}

fn mod_floor(a: i64, b: i64) -> i64 {
    a.rem_euclid(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_epoch_roundtrips() {
        // 1979-03-21 Gregorian is Farvardin 1, 1358.
        let g = NaiveDate::from_ymd_opt(1979, 3, 21).unwrap();
        let j = to_jalali(g);
        assert_eq!(j, JalaliDate::new(1358, 1, 1));
        assert_eq!(to_gregorian(j), Some(g));
    }

    #[test]
    fn recent_new_year_roundtrips() {
        let g = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let j = to_jalali(g);
        assert_eq!(j, JalaliDate::new(1403, 1, 1));
        assert_eq!(to_gregorian(j), Some(g));
    }

    #[test]
    fn roundtrip_is_stable_across_a_year() {
        let mut d = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        while d < end {
            let j = to_jalali(d);
            assert_eq!(to_gregorian(j), Some(d), "mismatch at {d}");
            d = d.succ_opt().unwrap();
        }
    }

    #[test]
    fn fixed_holidays_are_recognized() {
        assert!(JalaliDate::new(1403, 1, 1).is_fixed_holiday());
        assert!(JalaliDate::new(1403, 12, 29).is_fixed_holiday());
        assert!(!JalaliDate::new(1403, 6, 15).is_fixed_holiday());
    }

    #[test]
    fn jalali_day_range_spans_exactly_one_tehran_day() {
        let (start, end) = jalali_day_range_to_utc(JalaliDate::new(1403, 1, 1)).unwrap();
        assert_eq!((end - start).num_hours(), 24);
    }

    #[test]
    fn weekday_saturday_is_zero() {
        // 2024-03-23 is a Saturday.
        let sat = NaiveDate::from_ymd_opt(2024, 3, 23).unwrap();
        assert_eq!(tehran_weekday(sat), 0);
        let fri = sat.pred_opt().unwrap();
        assert_eq!(tehran_weekday(fri), 6);
    }
}
