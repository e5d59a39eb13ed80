/// Training Center activity model
///
/// Owned, non-cyclic mirror of the document nesting:
/// Database -> Activity -> Lap -> Trackpoint.
///
/// Every level implements `Display` as an indented Begin/End block so a
/// whole parsed file can be dumped for inspection.

use std::fmt;
use chrono::{DateTime, Duration, FixedOffset};

pub const DEFAULT_SENSOR_STATE: &str = "Absent";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trackpoint {
    pub time: DateTime<FixedOffset>,
    pub position: Position,
    pub altitude_m: f64,
    /// Cumulative distance from the start, rewritten by GPS error correction
    pub distance_m: f64,
    pub heart_rate_bpm: u32,
    pub sensor_state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lap {
    pub start_time: DateTime<FixedOffset>,
    pub total_time: Duration,
    pub distance_m: f64,
    pub max_speed: f64,
    pub calories: u32,
    pub avg_heart_rate_bpm: u32,
    pub max_heart_rate_bpm: u32,
    pub intensity: String,
    pub trigger_method: String,
    pub trackpoints: Vec<Trackpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub sport: String,
    pub id: String,
    pub laps: Vec<Lap>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Database {
    pub activities: Vec<Activity>,
}

impl Trackpoint {
    /// Trackpoint with every optional field at its hard default
    pub fn with_defaults(time: DateTime<FixedOffset>) -> Self {
        Trackpoint {
            time,
            position: Position::default(),
            altitude_m: 0.0,
            distance_m: 0.0,
            heart_rate_bpm: 0,
            sensor_state: DEFAULT_SENSOR_STATE.to_string(),
        }
    }
}

impl Activity {
    pub fn trackpoint_count(&self) -> usize {
        self.laps.iter().map(|lap| lap.trackpoints.len()).sum()
    }
}

/// `H:MM:SS`, hours are not wrapped into days
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!("{}{}:{:02}:{:02}", sign, total / 3600, (total % 3600) / 60, total % 60)
}

fn indent(level: usize) -> String {
    " ".repeat(level * 2)
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = indent(4);
        writeln!(f, "{}-- Position Begin --", pad)?;
        writeln!(f, "{}  Latitude: {}", pad, self.latitude)?;
        writeln!(f, "{}  Longitude: {}", pad, self.longitude)?;
        writeln!(f, "{}-- Position End --", pad)
    }
}

impl fmt::Display for Trackpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = indent(3);
        writeln!(f, "{}-- Trackpoint Begin --", pad)?;
        writeln!(f, "{}  Time: {}", pad, self.time.format("%Y-%m-%d %H:%M:%S%:z"))?;
        write!(f, "{}", self.position)?;
        writeln!(f, "{}  Altitude (meters): {}", pad, self.altitude_m)?;
        writeln!(f, "{}  Distance (meters): {}", pad, self.distance_m)?;
        writeln!(f, "{}  Heartrate (bpm): {}", pad, self.heart_rate_bpm)?;
        writeln!(f, "{}  Sensor State: {}", pad, self.sensor_state)?;
        writeln!(f, "{}-- Trackpoint End --", pad)
    }
}

impl fmt::Display for Lap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = indent(2);
        writeln!(f, "{}-- Begin Lap --", pad)?;
        writeln!(f, "{}  Start Time: {}", pad, self.start_time.format("%Y-%m-%d %H:%M:%S%:z"))?;
        writeln!(f, "{}  Total Time: {}", pad, format_duration(self.total_time))?;
        writeln!(f, "{}  Distance (meters): {}", pad, self.distance_m)?;
        writeln!(f, "{}  Maximum Speed (m/s): {}", pad, self.max_speed)?;
        writeln!(f, "{}  Calories (kcal): {}", pad, self.calories)?;
        writeln!(f, "{}  Average Heartrate (bpm): {}", pad, self.avg_heart_rate_bpm)?;
        writeln!(f, "{}  Maximum Heartrate (bpm): {}", pad, self.max_heart_rate_bpm)?;
        writeln!(f, "{}  Intensity: {}", pad, self.intensity)?;
        writeln!(f, "{}  Trigger Method: {}", pad, self.trigger_method)?;
        writeln!(f, "{}  Trackpoints: {}", pad, self.trackpoints.len())?;
        for (i, trackpoint) in self.trackpoints.iter().enumerate() {
            writeln!(f, "{}  Trackpoint Num: {}", pad, i + 1)?;
            write!(f, "{}", trackpoint)?;
        }
        writeln!(f, "{}-- End Lap --", pad)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = indent(1);
        writeln!(f, "{}-- Begin Activity --", pad)?;
        writeln!(f, "{}  Sport: {}", pad, self.sport)?;
        writeln!(f, "{}  Id: {}", pad, self.id)?;
        writeln!(f, "{}  Laps: {}", pad, self.laps.len())?;
        for (i, lap) in self.laps.iter().enumerate() {
            writeln!(f, "{}  Lap Num: {}", pad, i + 1)?;
            write!(f, "{}", lap)?;
        }
        writeln!(f, "{}-- End Activity --", pad)
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-- TrainingCenterDatabase Begin")?;
        writeln!(f, "  Activities: {}", self.activities.len())?;
        for (i, activity) in self.activities.iter().enumerate() {
            writeln!(f, "  Activity Num: {}", i + 1)?;
            write!(f, "{}", activity)?;
        }
        writeln!(f, "-- TrainingCenterDatabase End")
    }
}
