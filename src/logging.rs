//! Single-line `key=value` diagnostics on stderr.
//!
//! Every line starts with `TOGGL_SYNC_<LEVEL>` so wrappers can grep for it, and
//! values are sanitized so one event never spans more than one line.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
        }
    }
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

fn quiet() -> bool {
    matches!(
        std::env::var("TOGGL_SYNC_QUIET").as_deref().map(str::trim),
        Ok("1" | "true" | "yes" | "on")
    )
}

pub fn format_line(level: Level, stage: &str, fields: &[(&str, String)]) -> String {
    let mut line = format!("TOGGL_SYNC_{} stage={}", level.label(), sanitize_value(stage));
    for (key, value) in fields {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&sanitize_value(value));
    }
    line
}

pub fn emit(level: Level, stage: &str, fields: &[(&str, String)]) {
    if level == Level::Info && quiet() {
        return;
    }
    eprintln!("{}", format_line(level, stage, fields));
}

pub fn info(stage: &str, fields: &[(&str, String)]) {
    emit(Level::Info, stage, fields);
}

pub fn warn(stage: &str, fields: &[(&str, String)]) {
    emit(Level::Warn, stage, fields);
}
