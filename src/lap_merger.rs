/// Lap merging
///
/// Collapses every lap of an activity into the first one so the split
/// report can walk a single chronological trackpoint sequence.
///
/// Heart rate aggregation is kept compatible with the exports this tool
/// has always produced:
/// - average HR is the pairwise mean of the running value and the next lap
/// - maximum HR is taken from the *average* fields of both laps

use tracing::debug;

use crate::tcx_model::{Activity, Lap};

/// Fold `absorbed` into `acc`
pub fn merge_lap(acc: &mut Lap, absorbed: &Lap) {
    acc.trackpoints.extend(absorbed.trackpoints.iter().cloned());

    acc.total_time = acc.total_time + absorbed.total_time;
    acc.distance_m += absorbed.distance_m;
    acc.max_speed = acc.max_speed.max(absorbed.max_speed);
    acc.calories += absorbed.calories;

    acc.avg_heart_rate_bpm = (acc.avg_heart_rate_bpm + absorbed.avg_heart_rate_bpm) / 2;
    // Known quirk: compares averages, not maxima
    acc.max_heart_rate_bpm = acc.avg_heart_rate_bpm.max(absorbed.avg_heart_rate_bpm);
}

/// Merge `laps[1..]` into `laps[0]` in order
///
/// With `delete_originals` the merged-away laps are removed, otherwise they
/// stay in the activity unchanged. Activities with fewer than two laps are
/// left alone.
pub fn merge_laps(activity: &mut Activity, delete_originals: bool) {
    if activity.laps.len() < 2 {
        return;
    }

    let original_count = activity.laps.len();
    let (first, rest) = activity.laps.split_at_mut(1);
    let acc = &mut first[0];
    for lap in rest.iter() {
        merge_lap(acc, lap);
    }

    if delete_originals {
        activity.laps.truncate(1);
    }

    debug!(
        "Merged {} laps of activity {}: {:.1} m, {} trackpoints",
        original_count,
        activity.id,
        activity.laps[0].distance_m,
        activity.laps[0].trackpoints.len()
    );
}
