use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta, Timelike, Utc};

use crate::registry::ModelDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunTimestamp(DateTime<Utc>);

impl RunTimestamp {
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn hour_stamp(&self) -> String {
        format!("{:02}", self.0.hour())
    }

    pub fn date_stamp(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

// Run intervals are counted from the Unix epoch.
pub fn most_recent_run(model: &ModelDescriptor, now: DateTime<Utc>) -> RunTimestamp {
    let available = now - TimeDelta::minutes(model.publication_delay_minutes);
    let interval = i64::from(model.run_interval_hours) * 3600;
    let excess = TimeDelta::seconds(available.timestamp().rem_euclid(interval))
        + TimeDelta::nanoseconds(i64::from(available.timestamp_subsec_nanos()));
    RunTimestamp(available - excess)
}
