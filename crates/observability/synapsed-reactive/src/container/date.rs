//! Date implementation - an instant plus a fixed offset, observed through virtual properties

use super::Hooks;
use crate::types::{ContainerId, MutationId, ReactiveError, ReactiveResult};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

const MS_PER_SECOND: i128 = 1_000;
const MS_PER_MINUTE: i128 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i128 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i128 = 24 * MS_PER_HOUR;

/// Virtual properties a date exposes as slots. Months are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateProperty {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    UtcYear,
    UtcMonth,
    UtcDay,
    UtcHour,
    UtcMinute,
    UtcSecond,
    UtcMillisecond,
    /// Milliseconds since the Unix epoch
    Time,
}

impl DateProperty {
    pub const ALL: [DateProperty; 15] = [
        DateProperty::Year,
        DateProperty::Month,
        DateProperty::Day,
        DateProperty::Hour,
        DateProperty::Minute,
        DateProperty::Second,
        DateProperty::Millisecond,
        DateProperty::UtcYear,
        DateProperty::UtcMonth,
        DateProperty::UtcDay,
        DateProperty::UtcHour,
        DateProperty::UtcMinute,
        DateProperty::UtcSecond,
        DateProperty::UtcMillisecond,
        DateProperty::Time,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DateProperty::Year => "year",
            DateProperty::Month => "month",
            DateProperty::Day => "day",
            DateProperty::Hour => "hour",
            DateProperty::Minute => "minute",
            DateProperty::Second => "second",
            DateProperty::Millisecond => "millisecond",
            DateProperty::UtcYear => "utcYear",
            DateProperty::UtcMonth => "utcMonth",
            DateProperty::UtcDay => "utcDay",
            DateProperty::UtcHour => "utcHour",
            DateProperty::UtcMinute => "utcMinute",
            DateProperty::UtcSecond => "utcSecond",
            DateProperty::UtcMillisecond => "utcMillisecond",
            DateProperty::Time => "time",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn is_utc(&self) -> bool {
        matches!(
            self,
            DateProperty::UtcYear
                | DateProperty::UtcMonth
                | DateProperty::UtcDay
                | DateProperty::UtcHour
                | DateProperty::UtcMinute
                | DateProperty::UtcSecond
                | DateProperty::UtcMillisecond
                | DateProperty::Time
        )
    }
}

/// Payload delivered to date hooks after a setter changed the instant
#[derive(Debug, Clone)]
pub struct DateMutation {
    pub mutation: MutationId,
    pub property: DateProperty,
    pub before: i64,
    pub after: i64,
    pub offset_seconds: i32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Parts {
    year: i128,
    month: i128,
    day: i128,
    hour: i128,
    minute: i128,
    second: i128,
    millisecond: i128,
}

impl Parts {
    fn at(epoch_ms: i64) -> Option<Self> {
        let naive = DateTime::<Utc>::from_timestamp_millis(epoch_ms)?.naive_utc();
        Some(Self {
            year: i128::from(naive.year()),
            month: i128::from(naive.month()),
            day: i128::from(naive.day()),
            hour: i128::from(naive.hour()),
            minute: i128::from(naive.minute()),
            second: i128::from(naive.second()),
            millisecond: i128::from(epoch_ms.rem_euclid(1000)),
        })
    }

    fn get(&self, property: DateProperty) -> i128 {
        match property {
            DateProperty::Year | DateProperty::UtcYear => self.year,
            DateProperty::Month | DateProperty::UtcMonth => self.month,
            DateProperty::Day | DateProperty::UtcDay => self.day,
            DateProperty::Hour | DateProperty::UtcHour => self.hour,
            DateProperty::Minute | DateProperty::UtcMinute => self.minute,
            DateProperty::Second | DateProperty::UtcSecond => self.second,
            DateProperty::Millisecond | DateProperty::UtcMillisecond => self.millisecond,
            DateProperty::Time => 0,
        }
    }

    fn put(&mut self, property: DateProperty, value: i128) {
        match property {
            DateProperty::Year | DateProperty::UtcYear => self.year = value,
            DateProperty::Month | DateProperty::UtcMonth => self.month = value,
            DateProperty::Day | DateProperty::UtcDay => self.day = value,
            DateProperty::Hour | DateProperty::UtcHour => self.hour = value,
            DateProperty::Minute | DateProperty::UtcMinute => self.minute = value,
            DateProperty::Second | DateProperty::UtcSecond => self.second = value,
            DateProperty::Millisecond | DateProperty::UtcMillisecond => self.millisecond = value,
            DateProperty::Time => {}
        }
    }

    /// Recomposes an instant, carrying overflow from each field into the next
    fn to_epoch_ms(self) -> Option<i64> {
        let month0 = self.month - 1;
        let year = i32::try_from(self.year + month0.div_euclid(12)).ok()?;
        let month = u32::try_from(month0.rem_euclid(12) + 1).ok()?;
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        let days = i128::from(first.signed_duration_since(epoch).num_days()) + self.day - 1;
        let total = days * MS_PER_DAY
            + self.hour * MS_PER_HOUR
            + self.minute * MS_PER_MINUTE
            + self.second * MS_PER_SECOND
            + self.millisecond;
        let total = i64::try_from(total).ok()?;
        DateTime::<Utc>::from_timestamp_millis(total).map(|_| total)
    }
}

/// Value of `property` for the instant `epoch_ms` at `offset_seconds`
pub(crate) fn component_at(epoch_ms: i64, offset_seconds: i32, property: DateProperty) -> f64 {
    if property == DateProperty::Time {
        return epoch_ms as f64;
    }
    let shift = if property.is_utc() {
        0
    } else {
        i64::from(offset_seconds) * 1000
    };
    epoch_ms
        .checked_add(shift)
        .and_then(Parts::at)
        .map(|parts| parts.get(property) as f64)
        .unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, Copy)]
struct Instant {
    epoch_ms: i64,
    offset_seconds: i32,
}

struct DateInner {
    id: ContainerId,
    state: RwLock<Instant>,
    hooks: Hooks<DateMutation>,
}

/// Mutable date with identity
#[derive(Clone)]
pub struct Date {
    inner: Arc<DateInner>,
}

impl Date {
    pub fn from_millis(epoch_ms: i64) -> Self {
        Self::with_offset(epoch_ms, 0)
    }

    pub fn with_offset(epoch_ms: i64, offset_seconds: i32) -> Self {
        Self {
            inner: Arc::new(DateInner {
                id: ContainerId::next(),
                state: RwLock::new(Instant {
                    epoch_ms,
                    offset_seconds,
                }),
                hooks: Hooks::new(),
            }),
        }
    }

    pub fn now() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    /// Midnight UTC of the given calendar day (1-based month)
    pub fn from_ymd(year: i32, month: u32, day: u32) -> ReactiveResult<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| ReactiveError::InvalidDate(format!("{year}-{month}-{day}")))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ReactiveError::InvalidDate(format!("{year}-{month}-{day}")))?;
        Ok(Self::from_millis(midnight.and_utc().timestamp_millis()))
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub(crate) fn hooks(&self) -> &Hooks<DateMutation> {
        &self.inner.hooks
    }

    pub fn epoch_millis(&self) -> i64 {
        self.inner.state.read().epoch_ms
    }

    pub fn offset_seconds(&self) -> i32 {
        self.inner.state.read().offset_seconds
    }

    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let instant = *self.inner.state.read();
        let offset = FixedOffset::east_opt(instant.offset_seconds)?;
        Some(DateTime::<Utc>::from_timestamp_millis(instant.epoch_ms)?.with_timezone(&offset))
    }

    pub fn component(&self, property: DateProperty) -> f64 {
        let instant = *self.inner.state.read();
        component_at(instant.epoch_ms, instant.offset_seconds, property)
    }

    /// Sets one virtual property. Out-of-range values roll over into the
    /// neighbouring fields, so month 13 is January of the next year.
    pub fn set(&self, property: DateProperty, value: f64) -> ReactiveResult<()> {
        let (before, after, offset_seconds) = self.apply(property, value)?;
        if before != after {
            self.inner.hooks.notify(&DateMutation {
                mutation: MutationId::next(),
                property,
                before,
                after,
                offset_seconds,
            });
        }
        Ok(())
    }

    pub fn set_time(&self, epoch_ms: i64) -> ReactiveResult<()> {
        self.set(DateProperty::Time, epoch_ms as f64)
    }

    pub fn set_full_year(&self, year: i32) -> ReactiveResult<()> {
        self.set(DateProperty::Year, f64::from(year))
    }

    pub fn set_month(&self, month: i32) -> ReactiveResult<()> {
        self.set(DateProperty::Month, f64::from(month))
    }

    pub fn set_day(&self, day: i32) -> ReactiveResult<()> {
        self.set(DateProperty::Day, f64::from(day))
    }

    pub fn set_hours(&self, hours: i32) -> ReactiveResult<()> {
        self.set(DateProperty::Hour, f64::from(hours))
    }

    pub(crate) fn set_component_untracked(
        &self,
        property: DateProperty,
        value: f64,
    ) -> ReactiveResult<()> {
        self.apply(property, value).map(|_| ())
    }

    fn apply(&self, property: DateProperty, value: f64) -> ReactiveResult<(i64, i64, i32)> {
        if !value.is_finite() {
            return Err(ReactiveError::InvalidDate(format!(
                "{} cannot be set to {value}",
                property.name()
            )));
        }

        let mut state = self.inner.state.write();
        let before = state.epoch_ms;
        let after = if property == DateProperty::Time {
            Some(value.trunc() as i64).filter(|ms| DateTime::<Utc>::from_timestamp_millis(*ms).is_some())
        } else {
            let shift = if property.is_utc() {
                0
            } else {
                i64::from(state.offset_seconds) * 1000
            };
            before.checked_add(shift).and_then(Parts::at).and_then(|mut parts| {
                parts.put(property, value.trunc() as i128);
                parts.to_epoch_ms().and_then(|ms| ms.checked_sub(shift))
            })
        };
        let after = after.ok_or_else(|| {
            ReactiveError::InvalidDate(format!(
                "{} = {value} is out of range",
                property.name()
            ))
        })?;
        state.epoch_ms = after;
        Ok((before, after, state.offset_seconds))
    }
}

impl fmt::Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Date")
            .field("id", &self.inner.id)
            .field("epoch_ms", &self.epoch_millis())
            .field("offset_seconds", &self.offset_seconds())
            .finish()
    }
}
