use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// A calendar month of the target year; selects both the destination sheet and
/// the record-source window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .with_context(|| format!("invalid period {year}-{month}"))?;
        Ok(Self { year, month })
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Period {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Short English month name, which doubles as the sheet title.
    pub fn sheet_name(&self) -> String {
        self.first_day().format("%b").to_string()
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Source window from local midnight on the 1st to local midnight on the
    /// 1st of the next month, expressed in UTC.
    pub fn window(&self, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = local_midnight(self.first_day(), tz)?;
        let end = local_midnight(self.next().first_day(), tz)?;
        Ok((start, end))
    }
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("no midnight on {date}"))?;
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("local midnight on {date} does not exist in {tz}"))?;
    Ok(local.with_timezone(&Utc))
}

/// January through the current month for the current year; the whole year
/// for past years; nothing for future years.
pub fn periods_for_year(year: i32, today: NaiveDate) -> Vec<Period> {
    let last_month = match year.cmp(&today.year()) {
        std::cmp::Ordering::Less => 12,
        std::cmp::Ordering::Equal => today.month(),
        std::cmp::Ordering::Greater => 0,
    };
    (1..=last_month).map(|month| Period { year, month }).collect()
}
