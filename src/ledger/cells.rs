use chrono::NaiveDate;

/// How a destination cell is interpreted when comparing it against a freshly
/// mapped value. Spreadsheets reformat what they are given, so both sides are
/// reduced to one canonical spelling before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Integer,
    Clock,
    Duration,
    Text,
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Render seconds as `H:MM`, hours unbounded, partial minutes dropped.
pub fn format_duration(total_secs: i64) -> String {
    let minutes = total_secs.div_euclid(60);
    let (hours, minutes) = (minutes.div_euclid(60), minutes.rem_euclid(60));
    format!("{hours}:{minutes:02}")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Prefix `value` with the text marker so the destination stores it verbatim.
pub fn as_text(value: &str, marker: &str) -> String {
    format!("{marker}{value}")
}

pub fn strip_marker<'a>(value: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return value;
    }
    value.strip_prefix(marker).unwrap_or(value)
}

fn parse_hms(raw: &str) -> Option<(i64, i64)> {
    let mut parts = raw.split(':');
    let hours = parts.next()?.trim().parse::<i64>().ok()?;
    let minutes = parts.next()?.trim().parse::<i64>().ok()?;
    if let Some(secs) = parts.next() {
        secs.trim().parse::<i64>().ok()?;
    }
    if parts.next().is_some() || hours < 0 || !(0..60).contains(&minutes) {
        return None;
    }
    Some((hours, minutes))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Canonical comparable spelling of a destination cell. Values that do not
/// parse as their kind are kept as trimmed text so they compare unequal.
pub fn normalize(kind: FieldKind, raw: &str, marker: &str) -> String {
    let trimmed = strip_marker(raw.trim(), marker).trim();
    match kind {
        FieldKind::Text => strip_marker(raw, marker).to_string(),
        FieldKind::Integer => trimmed
            .parse::<i64>()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| trimmed.to_string()),
        FieldKind::Clock => match parse_hms(trimmed) {
            Some((h, m)) if h < 24 => format!("{h:02}:{m:02}"),
            _ => trimmed.to_string(),
        },
        FieldKind::Duration => match parse_hms(trimmed) {
            Some((h, m)) => format!("{h}:{m:02}"),
            None => trimmed.to_string(),
        },
        FieldKind::Date => parse_date(trimmed)
            .map(format_date)
            .unwrap_or_else(|| trimmed.to_string()),
    }
}
