/// Split report pipeline
///
/// file -> Database -> merged Activity -> one CSV block per marker spacing

use std::io::Write;
use tracing::info;

use crate::lap_merger::merge_laps;
use crate::report_config::ReportConfig;
use crate::split_segmenter::{
    restore_distances, segment_activity, snapshot_distances, write_splits, DistanceMarkerSegmenter, SplitError,
};
use crate::tcx_model::Database;
use crate::tcx_parser::{parse_file, ParseError};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("activity {index} not found (file has {available})")]
    ActivityNotFound { index: usize, available: usize },
}

/// Parse the configured file and write every report to `out`
pub fn run<W: Write>(config: &ReportConfig, out: &mut W) -> Result<(), ReportError> {
    let mut database = parse_file(&config.input)?;
    render(&mut database, config, out)
}

/// Merge, optionally dump, and segment an already parsed database
pub fn render<W: Write>(database: &mut Database, config: &ReportConfig, out: &mut W) -> Result<(), ReportError> {
    let available = database.activities.len();
    let activity = database
        .activities
        .get_mut(config.activity_index)
        .ok_or(ReportError::ActivityNotFound { index: config.activity_index, available })?;

    if config.merge_laps {
        merge_laps(activity, config.delete_merged_laps);
    }

    if config.dump_database {
        write!(out, "{}", database)?;
    }

    // Re-borrow after the dump, the index was checked above
    let activity = database
        .activities
        .get_mut(config.activity_index)
        .ok_or(ReportError::ActivityNotFound { index: config.activity_index, available })?;

    let raw_distances = activity
        .laps
        .first()
        .map(|lap| snapshot_distances(&lap.trackpoints))
        .unwrap_or_default();

    for &spacing in &config.spacings_m {
        if config.independent_runs {
            if let Some(lap) = activity.laps.first_mut() {
                restore_distances(&mut lap.trackpoints, &raw_distances);
            }
        }

        let segmenter = DistanceMarkerSegmenter::new(config.reference_distance_m, spacing);
        let rows = segment_activity(activity, &segmenter)?;
        info!("{} m splits: {} rows", segmenter.spacing_m(), rows.len());
        write_splits(&rows, &mut *out)?;
    }

    Ok(())
}
