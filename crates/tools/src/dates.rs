//! Natural-language date parsing for tool arguments.
//!
//! Understands what people type when talking about expenses:
//! - ISO and RFC 3339 (`2024-01-05`, `2024-01-05T10:00:00Z`), `01/05/2024`, `5.1.2024`
//! - `today`, `now`, `yesterday`, `tomorrow`, `day before yesterday`
//! - `3 days ago`, `a week ago`, `in 2 days`, `last week`, `last month`, `last year`
//! - `1 January`, `January 1st`, `Jan 1, 2024`, `1st of March 2023`, `March 2024`
//! - weekday names: `monday`, `last friday`
//!
//! A missing year means the current year. Everything is interpreted in UTC.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};

/// A parsed date, with a time of day only when the input named one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl ParsedDate {
    fn day(date: NaiveDate) -> Self {
        Self { date, time: None }
    }

    /// Earliest instant the input refers to.
    pub fn start_bound(&self) -> DateTime<Utc> {
        self.date.and_time(self.time.unwrap_or(NaiveTime::MIN)).and_utc()
    }

    /// Latest instant the input refers to. A bare date covers the whole day.
    pub fn end_bound(&self) -> DateTime<Utc> {
        let end_of_day = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        self.date.and_time(self.time.unwrap_or(end_of_day)).and_utc()
    }
}

/// Parse `input` relative to `now`. Returns `None` when nothing matches.
pub fn parse(input: &str, now: DateTime<Utc>) -> Option<ParsedDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    parse_absolute(trimmed)
        .or_else(|| parse_words(trimmed, now))
}

fn parse_absolute(s: &str) -> Option<ParsedDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        let utc = dt.with_timezone(&Utc);
        return Some(ParsedDate {
            date: utc.date_naive(),
            time: Some(utc.time()),
        });
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ParsedDate {
                date: dt.date(),
                time: Some(dt.time()),
            });
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(ParsedDate::day(date));
        }
    }

    None
}

fn parse_words(s: &str, now: DateTime<Utc>) -> Option<ParsedDate> {
    let lowered = s.to_lowercase().replace(',', " ");
    let words: Vec<&str> = lowered
        .split_whitespace()
        .filter(|w| !matches!(*w, "of" | "the" | "on"))
        .collect();
    let today = now.date_naive();

    match words.as_slice() {
        ["now"] | ["right", "now"] => {
            return Some(ParsedDate {
                date: today,
                time: Some(now.time()),
            });
        }
        ["today"] => return Some(ParsedDate::day(today)),
        ["yesterday"] => return shift(today, 1, "day", false).map(ParsedDate::day),
        ["tomorrow"] => return shift(today, 1, "day", true).map(ParsedDate::day),
        ["day", "before", "yesterday"] => return shift(today, 2, "day", false).map(ParsedDate::day),
        ["day", "after", "tomorrow"] => return shift(today, 2, "day", true).map(ParsedDate::day),
        ["last", unit] | ["past", unit] | ["previous", unit] => {
            if let Some(weekday) = weekday(unit) {
                return Some(ParsedDate::day(previous_weekday(today, weekday)));
            }
            return shift(today, 1, unit, false).map(ParsedDate::day);
        }
        ["next", unit] => {
            if let Some(weekday) = weekday(unit) {
                return Some(ParsedDate::day(next_weekday(today, weekday)));
            }
            return shift(today, 1, unit, true).map(ParsedDate::day);
        }
        [amount, unit, "ago"] => {
            return shift(today, quantity(amount)?, unit, false).map(ParsedDate::day);
        }
        ["in", amount, unit] => {
            return shift(today, quantity(amount)?, unit, true).map(ParsedDate::day);
        }
        [single] => {
            if let Some(weekday) = weekday(single) {
                return Some(ParsedDate::day(most_recent_weekday(today, weekday)));
            }
        }
        _ => {}
    }

    parse_calendar(&words, today.year()).map(ParsedDate::day)
}

/// Day/month/year phrases in either order: `1 january 2024`, `jan 1 2024`,
/// `january 2024`, `1 jan`.
fn parse_calendar(words: &[&str], current_year: i32) -> Option<NaiveDate> {
    match words {
        [a, b] => {
            if let (Some(day), Some(month)) = (day_number(a), month(b)) {
                return NaiveDate::from_ymd_opt(current_year, month, day);
            }
            if let (Some(month), Some(day)) = (month(a), day_number(b)) {
                return NaiveDate::from_ymd_opt(current_year, month, day);
            }
            if let (Some(month), Some(year)) = (month(a), year(b)) {
                return NaiveDate::from_ymd_opt(year, month, 1);
            }
            None
        }
        [a, b, c] => {
            let year = year(c)?;
            if let (Some(day), Some(month)) = (day_number(a), month(b)) {
                return NaiveDate::from_ymd_opt(year, month, day);
            }
            if let (Some(month), Some(day)) = (month(a), day_number(b)) {
                return NaiveDate::from_ymd_opt(year, month, day);
            }
            None
        }
        [single] => month(single).map(|m| NaiveDate::from_ymd_opt(current_year, m, 1))?,
        _ => None,
    }
}

fn shift(today: NaiveDate, n: u32, unit: &str, forward: bool) -> Option<NaiveDate> {
    let unit = unit.trim_end_matches('s');
    let by_days = |days: i64| {
        let d = Duration::try_days(days)?;
        if forward { today.checked_add_signed(d) } else { today.checked_sub_signed(d) }
    };
    let by_months = |months: u32| {
        let m = Months::new(months);
        if forward { today.checked_add_months(m) } else { today.checked_sub_months(m) }
    };
    match unit {
        "day" => by_days(i64::from(n)),
        "week" => by_days(7 * i64::from(n)),
        "fortnight" => by_days(14 * i64::from(n)),
        "month" => by_months(n),
        "year" => by_months(n.checked_mul(12)?),
        _ => None,
    }
}

fn quantity(word: &str) -> Option<u32> {
    match word {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        "ten" => Some(10),
        other => other.parse().ok(),
    }
}

fn day_number(word: &str) -> Option<u32> {
    let digits = word
        .trim_end_matches("st")
        .trim_end_matches("nd")
        .trim_end_matches("rd")
        .trim_end_matches("th");
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

fn year(word: &str) -> Option<i32> {
    if word.len() != 4 {
        return None;
    }
    word.parse().ok()
}

fn month(word: &str) -> Option<u32> {
    let m = match word.trim_end_matches('.') {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn weekday(word: &str) -> Option<Weekday> {
    let day = match word {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// Today if it is `weekday`, else the latest earlier one.
fn most_recent_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (7 + today.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    today - Duration::days(back.into())
}

/// Strictly before today.
fn previous_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    most_recent_weekday(today - Duration::days(1), weekday)
}

/// Strictly after today.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    today + Duration::days(if ahead == 0 { 7 } else { ahead.into() })
}
