// SPDX-License-Identifier: Apache-2.0 OR MIT
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use liquid_engine::context::RenderContext;
use liquid_engine::{Error, FilterRegistryBuilder, Value};

use super::{expect_exact_args, filter_error, stringify};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder.register("date", date);
}

const CANDIDATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d-%b-%Y",
];

/// `date: format`. Accepts `"now"`/`"today"`, a unix timestamp, or a string
/// parsed tolerantly against a handful of common layouts, then formats the
/// result using `strftime`-style directives.
fn date(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "date", positional, 1)?;
    let format = stringify(&positional[0]);
    let when = resolve_datetime(ctx, &input)?;
    Ok(Value::str(when.format(&format).to_string()))
}

fn resolve_datetime(ctx: &RenderContext, input: &Value) -> Result<DateTime<Utc>, Error> {
    if let Value::Int(seconds) = input {
        return Utc
            .timestamp_opt(*seconds, 0)
            .single()
            .ok_or_else(|| filter_error(ctx, format!("date: timestamp {seconds} is out of range")));
    }

    let text = stringify(input);
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("now") || trimmed.eq_ignore_ascii_case("today") {
        return Ok(Utc::now());
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| filter_error(ctx, format!("date: timestamp {seconds} is out of range")));
    }
    for fmt in CANDIDATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&parsed));
        }
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&parsed.and_hms_opt(0, 0, 0).unwrap()));
        }
    }

    Err(filter_error(
        ctx,
        format!("date: could not parse '{trimmed}' as a date"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        super::super::empty_context()
    }

    #[test]
    fn date_formats_an_iso_string() {
        let mut c = ctx();
        let out = date(
            &mut c,
            Value::str("2023-05-17"),
            &[Value::str("%Y/%m/%d")],
            &[],
        )
        .unwrap();
        assert_eq!(out.as_str_lossy(), "2023/05/17");
    }

    #[test]
    fn date_accepts_unix_timestamps() {
        let mut c = ctx();
        let out = date(&mut c, Value::Int(0), &[Value::str("%Y-%m-%d")], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "1970-01-01");
    }

    #[test]
    fn date_now_does_not_error() {
        let mut c = ctx();
        let out = date(&mut c, Value::str("now"), &[Value::str("%Y")], &[]);
        assert!(out.is_ok());
    }

    #[test]
    fn date_rejects_unparseable_input() {
        let mut c = ctx();
        let out = date(&mut c, Value::str("not a date"), &[Value::str("%Y")], &[]);
        assert!(out.is_err());
    }
}
