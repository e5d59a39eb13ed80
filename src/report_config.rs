/// Split report parameters
///
/// Defaults describe a marathon with 1, 2, 5 and 10 km reports, laps merged
/// and the merged-away laps deleted.

use std::path::PathBuf;

pub const MARATHON_DISTANCE_M: f64 = 42195.0;
pub const DEFAULT_SPACINGS_M: [f64; 4] = [1000.0, 2000.0, 5000.0, 10000.0];

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub input: PathBuf,
    pub reference_distance_m: f64,
    pub spacings_m: Vec<f64>,
    pub activity_index: usize,
    pub merge_laps: bool,
    pub delete_merged_laps: bool,
    /// Restore raw distances before each spacing instead of chaining corrections
    pub independent_runs: bool,
    pub dump_database: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            input: PathBuf::from("activity.tcx"),
            reference_distance_m: MARATHON_DISTANCE_M,
            spacings_m: DEFAULT_SPACINGS_M.to_vec(),
            activity_index: 0,
            merge_laps: true,
            delete_merged_laps: true,
            independent_runs: false,
            dump_database: false,
        }
    }
}
