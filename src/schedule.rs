//! Recurrence schedules and their ISO-8601 repeating-interval wire form,
//! `R/<start>/<duration>`.
//!
//! Encoding anchors every schedule on 2012-01-01 (a Sunday) in the local
//! offset: the time of day, weekday and day of month are carried by that
//! start date.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    SecondsFormat, TimeZone, Timelike, Weekday,
};
use regex::Regex;
use thiserror::Error;

const REFERENCE_YEAR: i32 = 2012;

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:[.,]\d+)?S)?)?$")
        .expect("valid duration regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    Manual,
    Monthly,
    Weekly,
    Daily,
    Timely,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Manual,
    Monthly { monthday: u32, daytime: NaiveTime },
    Weekly { weekday: Weekday, daytime: NaiveTime },
    Daily { daytime: NaiveTime },
    Timely { everyminutes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Cannot parse value {0}")]
    CannotParse(String),
    #[error("Invalid day of month {0}")]
    InvalidMonthday(u32),
    #[error("Interval must be at least one minute")]
    ZeroInterval,
}

impl Schedule {
    pub fn frequency(&self) -> Frequency {
        match self {
            Self::Manual => Frequency::Manual,
            Self::Monthly { .. } => Frequency::Monthly,
            Self::Weekly { .. } => Frequency::Weekly,
            Self::Daily { .. } => Frequency::Daily,
            Self::Timely { .. } => Frequency::Timely,
        }
    }
}

fn default_daytime() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(REFERENCE_YEAR, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Decodes a wire schedule. Empty strings and strings without `/` are manual.
pub fn parse_iso8601(value: &str) -> Result<Schedule, ScheduleError> {
    if value.is_empty() || !value.contains('/') {
        return Ok(Schedule::Manual);
    }
    let cannot_parse = || ScheduleError::CannotParse(value.to_string());
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() < 3 {
        return Err(cannot_parse());
    }
    let start = || parse_start(parts[1]).ok_or_else(cannot_parse);

    match parts[2] {
        "P1M" => {
            let start = start()?;
            Ok(Schedule::Monthly {
                monthday: start.day(),
                daytime: time_of_day(&start),
            })
        }
        "P7D" => {
            let start = start()?;
            Ok(Schedule::Weekly {
                weekday: start.weekday(),
                daytime: time_of_day(&start),
            })
        }
        "PT24H" | "P1D" => Ok(Schedule::Daily {
            daytime: time_of_day(&start()?),
        }),
        other => parse_duration_minutes(other)
            .map(|everyminutes| Schedule::Timely { everyminutes })
            .ok_or_else(cannot_parse),
    }
}

/// Encodes in the local offset in effect on the reference date.
pub fn make_iso8601(schedule: &Schedule) -> Result<String, ScheduleError> {
    let midnight = reference_date().and_time(NaiveTime::MIN);
    let offset = Local
        .offset_from_local_datetime(&midnight)
        .earliest()
        .map(|o| o.fix())
        .unwrap_or_else(|| Local::now().offset().fix());
    make_iso8601_with_offset(schedule, offset)
}

pub fn make_iso8601_with_offset(
    schedule: &Schedule,
    offset: FixedOffset,
) -> Result<String, ScheduleError> {
    let reference = reference_date();
    let (date, daytime, duration) = match *schedule {
        Schedule::Manual => return Ok(String::new()),
        Schedule::Monthly { monthday, daytime } => {
            let date = NaiveDate::from_ymd_opt(REFERENCE_YEAR, 1, monthday)
                .ok_or(ScheduleError::InvalidMonthday(monthday))?;
            (date, daytime, "P1M".to_string())
        }
        Schedule::Weekly { weekday, daytime } => {
            let days = u64::from(weekday.num_days_from_sunday());
            (reference + Days::new(days), daytime, "P7D".to_string())
        }
        Schedule::Daily { daytime } => (reference, daytime, "PT24H".to_string()),
        Schedule::Timely { everyminutes } => {
            if everyminutes == 0 {
                return Err(ScheduleError::ZeroInterval);
            }
            (reference, NaiveTime::MIN, format_minutes(everyminutes))
        }
    };
    let daytime = NaiveTime::from_hms_opt(daytime.hour(), daytime.minute(), 0).unwrap_or(daytime);
    let start = offset
        .from_local_datetime(&date.and_time(daytime))
        .single()
        .ok_or_else(|| ScheduleError::CannotParse(date.to_string()))?;
    Ok(format!(
        "R/{}/{}",
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        duration
    ))
}

fn parse_start(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

fn time_of_day(start: &DateTime<FixedOffset>) -> NaiveTime {
    NaiveTime::from_hms_opt(start.hour(), start.minute(), start.second()).unwrap_or(NaiveTime::MIN)
}

/// Whole minutes in a week/day/time duration; `None` if the token is not a
/// duration or amounts to less than a minute.
fn parse_duration_minutes(token: &str) -> Option<u32> {
    let caps = DURATION.captures(token)?;
    let field = |i: usize| -> Option<Option<u64>> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<u64>().ok().map(Some),
            None => Some(None),
        }
    };
    let (weeks, days, hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?, field(4)?, field(5)?);
    if [weeks, days, hours, minutes, seconds].iter().all(Option::is_none) {
        return None;
    }
    let total = weeks.unwrap_or(0) * 7 * 24 * 60
        + days.unwrap_or(0) * 24 * 60
        + hours.unwrap_or(0) * 60
        + minutes.unwrap_or(0)
        + seconds.unwrap_or(0) / 60;
    match u32::try_from(total) {
        Ok(0) | Err(_) => None,
        Ok(total) => Some(total),
    }
}

fn format_minutes(everyminutes: u32) -> String {
    let (hours, minutes) = (everyminutes / 60, everyminutes % 60);
    // PT24H decodes as daily.
    if hours == 24 && minutes == 0 {
        return format!("PT{everyminutes}M");
    }
    match (hours, minutes) {
        (0, m) => format!("PT{m}M"),
        (h, 0) => format!("PT{h}H"),
        (h, m) => format!("PT{h}H{m}M"),
    }
}

/// Editor form state: a frequency plus whichever fields the user touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleForm {
    pub frequency: Frequency,
    pub monthday: Option<u32>,
    pub weekday: Option<Weekday>,
    pub daytime: Option<NaiveTime>,
    pub everyminutes: Option<u32>,
}

impl ScheduleForm {
    /// Switches frequency and seeds every missing field, so any frequency
    /// can be encoded right away.
    pub fn change_frequency(&mut self, frequency: Frequency) {
        self.frequency = frequency;
        self.monthday.get_or_insert(1);
        self.weekday.get_or_insert(Weekday::Mon);
        self.daytime.get_or_insert_with(default_daytime);
        self.everyminutes.get_or_insert(15);
    }

    pub fn to_schedule(&self) -> Schedule {
        let daytime = self.daytime.unwrap_or_else(default_daytime);
        match self.frequency {
            Frequency::Manual => Schedule::Manual,
            Frequency::Monthly => Schedule::Monthly {
                monthday: self.monthday.unwrap_or(1),
                daytime,
            },
            Frequency::Weekly => Schedule::Weekly {
                weekday: self.weekday.unwrap_or(Weekday::Mon),
                daytime,
            },
            Frequency::Daily => Schedule::Daily { daytime },
            Frequency::Timely => Schedule::Timely {
                everyminutes: self.everyminutes.unwrap_or(15),
            },
        }
    }
}

impl From<Schedule> for ScheduleForm {
    fn from(schedule: Schedule) -> Self {
        let mut form = Self {
            frequency: schedule.frequency(),
            ..Default::default()
        };
        match schedule {
            Schedule::Manual => {}
            Schedule::Monthly { monthday, daytime } => {
                form.monthday = Some(monthday);
                form.daytime = Some(daytime);
            }
            Schedule::Weekly { weekday, daytime } => {
                form.weekday = Some(weekday);
                form.daytime = Some(daytime);
            }
            Schedule::Daily { daytime } => form.daytime = Some(daytime),
            Schedule::Timely { everyminutes } => form.everyminutes = Some(everyminutes),
        }
        form
    }
}

/// Sentence templates for [`readable`]. Placeholders: `{monthday}`,
/// `{weekday}`, `{time}`, `{minutes}`.
#[derive(Debug, Clone)]
pub struct ScheduleLabels {
    pub manual: String,
    pub monthly: String,
    pub weekly: String,
    pub daily: String,
    pub timely: String,
    pub monthly_short: String,
    pub weekly_short: String,
    pub daily_short: String,
    pub timely_short: String,
    /// Sunday first.
    pub weekdays: [String; 7],
}

impl Default for ScheduleLabels {
    fn default() -> Self {
        let weekdays = ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"]
            .map(String::from);
        Self {
            manual: "Manually".to_string(),
            monthly: "Every month on day {monthday} at {time}".to_string(),
            weekly: "Every {weekday} at {time}".to_string(),
            daily: "Every day at {time}".to_string(),
            timely: "Every {minutes} minutes".to_string(),
            monthly_short: "Monthly".to_string(),
            weekly_short: "Weekly".to_string(),
            daily_short: "Daily".to_string(),
            timely_short: "{minutes}m".to_string(),
            weekdays,
        }
    }
}

pub fn readable(schedule: &Schedule, labels: &ScheduleLabels, short: bool) -> String {
    let fill = |template: &str, monthday: u32, weekday: Option<Weekday>, time: Option<NaiveTime>, minutes: u32| {
        let weekday = weekday
            .map(|w| labels.weekdays[w.num_days_from_sunday() as usize].as_str())
            .unwrap_or("");
        let time = time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
        template
            .replace("{monthday}", &monthday.to_string())
            .replace("{weekday}", weekday)
            .replace("{time}", &time)
            .replace("{minutes}", &minutes.to_string())
    };
    match *schedule {
        Schedule::Manual => labels.manual.clone(),
        Schedule::Monthly { monthday, daytime } => {
            let template = if short { labels.monthly_short.as_str() } else { labels.monthly.as_str() };
            fill(template, monthday, None, Some(daytime), 0)
        }
        Schedule::Weekly { weekday, daytime } => {
            let template = if short { labels.weekly_short.as_str() } else { labels.weekly.as_str() };
            fill(template, 0, Some(weekday), Some(daytime), 0)
        }
        Schedule::Daily { daytime } => {
            let template = if short { labels.daily_short.as_str() } else { labels.daily.as_str() };
            fill(template, 0, None, Some(daytime), 0)
        }
        Schedule::Timely { everyminutes } => {
            let template = if short { labels.timely_short.as_str() } else { labels.timely.as_str() };
            fill(template, 0, None, None, everyminutes)
        }
    }
}
