//! Stored record decoding.
//!
//! Files ending in `.GZB` are gzip-compressed protobuf, `.BPB` files are
//! plain protobuf. Only the daily summary is decoded here, and only the
//! activity-class durations that decide whether a local copy is complete.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use prost::Message;

use crate::error::ProtocolError;

/// A day is fully recorded once the activity classes cover this much time.
pub const FULL_DAY: Duration = Duration::from_secs(24 * 3600);

/// Return the protobuf bytes of a stored record, inflating `.GZB` files.
pub fn record_bytes(file_name: &str, raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if is_compressed(file_name) {
        let mut inflated = Vec::new();
        GzDecoder::new(raw).read_to_end(&mut inflated)?;
        Ok(inflated)
    } else {
        Ok(raw.to_vec())
    }
}

/// Decode a stored record of type `M`.
pub fn decode_record<M: Message + Default>(file_name: &str, raw: &[u8]) -> Result<M, ProtocolError> {
    let bytes = record_bytes(file_name, raw)?;
    M::decode(bytes.as_slice()).map_err(Into::into)
}

fn is_compressed(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("GZB"))
}

/// `PbDuration`.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct PbDuration {
    #[prost(uint32, optional, tag = "1")]
    pub hours: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub minutes: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub seconds: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub millis: Option<u32>,
}

impl PbDuration {
    #[must_use]
    pub fn to_duration(&self) -> Duration {
        let secs = u64::from(self.hours.unwrap_or(0)) * 3600
            + u64::from(self.minutes.unwrap_or(0)) * 60
            + u64::from(self.seconds.unwrap_or(0));
        Duration::from_secs(secs) + Duration::from_millis(u64::from(self.millis.unwrap_or(0)))
    }

    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        let secs = duration.as_secs();
        Self {
            hours: Some((secs / 3600) as u32),
            minutes: Some((secs / 60 % 60) as u32),
            seconds: Some((secs % 60) as u32),
            millis: Some(duration.subsec_millis()),
        }
    }
}

/// `PbActivityClassTimes`.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct ActivityClassTimes {
    #[prost(message, optional, tag = "1")]
    pub time_non_wear: Option<PbDuration>,
    #[prost(message, optional, tag = "2")]
    pub time_sleep: Option<PbDuration>,
    #[prost(message, optional, tag = "3")]
    pub time_sedentary: Option<PbDuration>,
    #[prost(message, optional, tag = "4")]
    pub time_light_activity: Option<PbDuration>,
    #[prost(message, optional, tag = "5")]
    pub time_continuous_moderate: Option<PbDuration>,
    #[prost(message, optional, tag = "6")]
    pub time_intermittent_moderate: Option<PbDuration>,
    #[prost(message, optional, tag = "7")]
    pub time_continuous_vigorous: Option<PbDuration>,
    #[prost(message, optional, tag = "8")]
    pub time_intermittent_vigorous: Option<PbDuration>,
}

impl ActivityClassTimes {
    /// Sum of every activity class.
    #[must_use]
    pub fn total(&self) -> Duration {
        [
            self.time_non_wear,
            self.time_sleep,
            self.time_sedentary,
            self.time_light_activity,
            self.time_continuous_moderate,
            self.time_intermittent_moderate,
            self.time_continuous_vigorous,
            self.time_intermittent_vigorous,
        ]
        .iter()
        .flatten()
        .map(PbDuration::to_duration)
        .sum()
    }
}

/// `PbDailySummary`, reduced to the fields sync looks at.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DailySummary {
    #[prost(message, optional, tag = "7")]
    pub activity_class_times: Option<ActivityClassTimes>,
}

impl DailySummary {
    /// Total time covered by the activity classes.
    #[must_use]
    pub fn total_recorded_activity(&self) -> Duration {
        self.activity_class_times
            .as_ref()
            .map_or(Duration::ZERO, ActivityClassTimes::total)
    }

    /// Whether the summary covers a whole day.
    #[must_use]
    pub fn is_complete_day(&self) -> bool {
        self.total_recorded_activity() >= FULL_DAY
    }
}
