use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

pub const DAY_KEY_FORMAT: &str =
  "%Y-%m-%d";
pub const MINUTES_PER_DAY: i64 =
  24 * 60;

const DST_GAP_STEP_MINUTES: i64 = 30;
const DST_GAP_MAX_STEPS: i64 = 6;

/// Parses a `YYYY-MM-DD` day key as
/// the view layer tags day columns and
/// calendar cells with.
#[must_use]
pub fn parse_day_key(
  raw: &str
) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(
    raw.trim(),
    DAY_KEY_FORMAT
  )
  .ok()
}

pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "timezone id cannot be empty"
    ));
  }
  trimmed.parse::<Tz>().map_err(|err| {
    anyhow!(
      "failed to parse timezone id \
       {trimmed}: {err}"
    )
  })
}

/// Calendar day of `dt` as seen in
/// `tz`.
#[must_use]
pub fn local_day(
  tz: &Tz,
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

/// Absolute instant of `minutes` past
/// local midnight of `day`. Values at
/// or past 24:00 land on the next
/// day's midnight.
#[must_use]
pub fn local_minutes_to_utc(
  tz: &Tz,
  day: NaiveDate,
  minutes: i64
) -> DateTime<Utc> {
  let minutes =
    minutes.clamp(0, MINUTES_PER_DAY);
  let midnight =
    day.and_time(NaiveTime::MIN);
  to_utc_from_local(
    tz,
    midnight + Duration::minutes(minutes)
  )
}

/// End of `day` in `tz`, i.e. the
/// following local midnight.
#[must_use]
pub fn end_of_local_day(
  tz: &Tz,
  day: NaiveDate
) -> DateTime<Utc> {
  local_minutes_to_utc(
    tz,
    day,
    MINUTES_PER_DAY
  )
}

fn to_utc_from_local(
  tz: &Tz,
  local_naive: NaiveDateTime
) -> DateTime<Utc> {
  for step in 0..=DST_GAP_MAX_STEPS {
    let candidate = local_naive
      + Duration::minutes(
        step * DST_GAP_STEP_MINUTES
      );
    match tz
      .from_local_datetime(&candidate)
    {
      | LocalResult::Single(local_dt) => {
        return local_dt
          .with_timezone(&Utc);
      }
      | LocalResult::Ambiguous(
        first,
        second
      ) => {
        tracing::debug!(
          local = %candidate,
          first = %first,
          second = %second,
          "ambiguous local datetime; using earliest"
        );
        let chosen = if first <= second
        {
          first
        } else {
          second
        };
        return chosen
          .with_timezone(&Utc);
      }
      | LocalResult::None => {
        tracing::debug!(
          local = %candidate,
          "local datetime falls in a dst gap; stepping forward"
        );
      }
    }
  }

  tracing::warn!(
    local = %local_naive,
    timezone = %tz,
    "no valid local datetime near requested time; reading it as utc"
  );
  Utc.from_utc_datetime(&local_naive)
}
