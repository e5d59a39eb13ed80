/// Distance-marker split segmentation
///
/// Corrects the device's cumulative distance against a known course length
/// and emits one split row each time the corrected distance crosses the
/// next marker (every `spacing_m` meters), plus a final row at the last
/// trackpoint.
///
/// Usage:
/// ```rust
/// let segmenter = DistanceMarkerSegmenter::new(42195.0, 1000.0);
/// let rows = segmenter.segment(lap.start_time, &mut lap.trackpoints)?;
/// ```
///
/// The correction is written back into each trackpoint, so a second run
/// over the same trackpoints sees corrected distances. Use
/// `snapshot_distances` / `restore_distances` for independent runs.

use std::io;
use chrono::{DateTime, Duration, FixedOffset};
use csv::Writer;
use serde::Serialize;
use tracing::{debug, warn};

use crate::tcx_model::{format_duration, Activity, Trackpoint};

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("invalid reference distance: reference {reference_m} m, recorded {recorded_m} m")]
    InvalidReferenceDistance { reference_m: f64, recorded_m: f64 },

    #[error("invalid marker spacing: {0} m")]
    InvalidSpacing(f64),

    #[error("no trackpoints to segment")]
    NoTrackpoints,

    #[error("activity has no laps")]
    NoLaps,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitRow {
    /// Marker position in kilometers
    pub km: f64,
    /// Approximate time of day at the marker
    pub time: DateTime<FixedOffset>,
    pub accum_lap_time: Duration,
    pub lap_time: Duration,
    pub pace: Duration,
}

/// CSV shape of a split row
#[derive(Debug, Serialize)]
struct SplitRecord {
    #[serde(rename = "Km")]
    km: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Accum Lap Time")]
    accum_lap_time: String,
    #[serde(rename = "Lap Time")]
    lap_time: String,
    #[serde(rename = "Pace")]
    pace: String,
}

impl From<&SplitRow> for SplitRecord {
    fn from(row: &SplitRow) -> Self {
        SplitRecord {
            // Debug keeps a trailing ".0" on whole kilometers
            km: format!("{:?}", row.km),
            time: row.time.format("%H:%M:%S").to_string(),
            accum_lap_time: format_duration(row.accum_lap_time),
            lap_time: format_duration(row.lap_time),
            pace: format_duration(row.pace),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceMarkerSegmenter {
    reference_distance_m: f64,
    spacing_m: f64,
}

impl DistanceMarkerSegmenter {
    /// # Arguments
    /// * `reference_distance_m` - true course length, e.g. 42195 for a marathon
    /// * `spacing_m` - distance between markers, e.g. 1000 for kilometer splits
    pub fn new(reference_distance_m: f64, spacing_m: f64) -> Self {
        DistanceMarkerSegmenter { reference_distance_m, spacing_m }
    }

    pub fn spacing_m(&self) -> f64 {
        self.spacing_m
    }

    /// GPS error ratio of the recorded total against the reference, to 2 decimals
    pub fn error_ratio(&self, recorded_total_m: f64) -> Result<f64, SplitError> {
        let reference = self.reference_distance_m;
        if !reference.is_finite() || reference <= 0.0 || recorded_total_m == 0.0 || !recorded_total_m.is_finite() {
            return Err(SplitError::InvalidReferenceDistance {
                reference_m: reference,
                recorded_m: recorded_total_m,
            });
        }
        Ok(round2(recorded_total_m / reference - 1.0))
    }

    pub fn segment(
        &self,
        start_time: DateTime<FixedOffset>,
        trackpoints: &mut [Trackpoint],
    ) -> Result<Vec<SplitRow>, SplitError> {
        if !self.spacing_m.is_finite() || self.spacing_m <= 0.0 {
            return Err(SplitError::InvalidSpacing(self.spacing_m));
        }
        let last_distance = trackpoints.last().ok_or(SplitError::NoTrackpoints)?.distance_m;
        let gps_error = self.error_ratio(last_distance)?;
        debug!(
            "Segmenting {} trackpoints every {} m, GPS error {:.2}",
            trackpoints.len(),
            self.spacing_m,
            gps_error
        );

        let total_points = trackpoints.len();
        let mut base_dist = self.spacing_m;
        let mut dist = base_dist;
        let mut prev_time = start_time;
        let mut prev_dist = 0.0;
        let mut rows = Vec::new();

        for (index, trackpoint) in trackpoints.iter_mut().enumerate() {
            trackpoint.distance_m -= trackpoint.distance_m * gps_error;
            let adj_dist = trackpoint.distance_m;
            let is_last = index + 1 == total_points;

            if adj_dist < dist && !is_last {
                continue;
            }

            let seg_secs = (trackpoint.time - prev_time).num_seconds();
            let seg_dist = adj_dist - prev_dist;

            if is_last {
                dist = dist - base_dist + seg_dist;
                base_dist = seg_dist;
            }

            if seg_dist <= 0.0 {
                warn!(
                    "No distance progress at marker {:.3} km ({}), skipping row",
                    dist / 1000.0,
                    trackpoint.time.format("%H:%M:%S")
                );
                dist += base_dist;
                continue;
            }

            let seg_secs_f = seg_secs as f64;
            let pace = Duration::seconds((1000.0 * seg_secs_f / seg_dist).trunc() as i64);
            let lap_time = Duration::seconds((base_dist * seg_secs_f / seg_dist).trunc() as i64);
            let time = prev_time + lap_time;

            rows.push(SplitRow {
                km: dist / 1000.0,
                time,
                accum_lap_time: time - start_time,
                lap_time,
                pace,
            });

            dist += base_dist;
            prev_dist = adj_dist;
            prev_time = trackpoint.time;
        }

        Ok(rows)
    }
}

/// Segment the first lap of an (already merged) activity
pub fn segment_activity(
    activity: &mut Activity,
    segmenter: &DistanceMarkerSegmenter,
) -> Result<Vec<SplitRow>, SplitError> {
    let lap = activity.laps.first_mut().ok_or(SplitError::NoLaps)?;
    let start_time = lap.start_time;
    segmenter.segment(start_time, &mut lap.trackpoints)
}

pub fn snapshot_distances(trackpoints: &[Trackpoint]) -> Vec<f64> {
    trackpoints.iter().map(|tp| tp.distance_m).collect()
}

pub fn restore_distances(trackpoints: &mut [Trackpoint], distances: &[f64]) {
    for (trackpoint, &distance) in trackpoints.iter_mut().zip(distances) {
        trackpoint.distance_m = distance;
    }
}

/// Write `Km,Time,Accum Lap Time,Lap Time,Pace` followed by one line per row
pub fn write_splits<W: io::Write>(rows: &[SplitRow], out: W) -> Result<(), csv::Error> {
    let mut writer = Writer::from_writer(out);
    if rows.is_empty() {
        writer.write_record(["Km", "Time", "Accum Lap Time", "Lap Time", "Pace"])?;
    }
    for row in rows {
        writer.serialize(SplitRecord::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Round to 2 decimals on the exact decimal value, ties to even
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
