//! Per-layer CSV statistics writers
//!
//! Rows are appended so repeated simulator runs accumulate in one file; the
//! header is written only when the file is new or empty.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;
use crate::network::LayerReport;

fn open_appending(path: &Path) -> Result<(std::fs::File, bool)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_empty = file.metadata()?.len() == 0;
    Ok((file, is_empty))
}

/// Append one row per layer to the cycle summary CSV
pub fn append_layer_summary(path: impl AsRef<Path>, report: &LayerReport) -> Result<()> {
    let (file, is_empty) = open_appending(path.as_ref())?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if is_empty {
        writer.write_record([
            "layer_id",
            "step_cycles_total",
            "preload_input_cycles",
            "weight_load_cycle",
            "output_drain_cycles",
            "output_store_cycles",
        ])?;
    }

    let s = &report.stats;
    writer.write_record([
        report.layer_id.to_string(),
        s.step_cycles_total.to_string(),
        s.preload_input_cycles.to_string(),
        s.weight_load_cycles.to_string(),
        s.output_drain_cycles.to_string(),
        s.output_store_cycles.to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

/// Append one row per layer to the weight-cache summary CSV.
///
/// A no-op for reports without cache statistics.
pub fn append_cache_summary(path: impl AsRef<Path>, report: &LayerReport) -> Result<()> {
    let Some(cache) = &report.cache else {
        return Ok(());
    };

    let (file, is_empty) = open_appending(path.as_ref())?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if is_empty {
        writer.write_record([
            "layer_id",
            "demand_accesses",
            "demand_misses",
            "miss_rate",
            "demand_hit_cycles",
            "demand_miss_cycles",
            "prefetch_requests",
            "prefetch_misses",
            "unique_demand_lines",
            "mean_reuse_distance",
        ])?;
    }

    writer.write_record([
        report.layer_id.to_string(),
        cache.demand_accesses.to_string(),
        cache.demand_misses.to_string(),
        format!("{:.4}", cache.miss_rate()),
        cache.demand_hit_cycles.to_string(),
        cache.demand_miss_cycles.to_string(),
        cache.prefetch_requests.to_string(),
        cache.prefetch_misses.to_string(),
        cache.unique_demand_lines.to_string(),
        format!("{:.2}", cache.mean_reuse_distance()),
    ])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinesim_core::LayerCycleStats;

    fn report() -> LayerReport {
        let mut stats = LayerCycleStats::default();
        stats.step_cycles_total = 100;
        stats.preload_input_cycles = 10;
        stats.weight_load_cycles = 20;
        stats.output_drain_cycles = 5;
        stats.output_store_cycles = 7;
        LayerReport {
            layer_id: 1,
            name: "conv1".into(),
            h_out: 2,
            w_out: 2,
            total_tiles: 1,
            drained_entries: 42,
            stats,
            cache: None,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles_layer_summary.csv");

        append_layer_summary(&path, &report()).unwrap();
        append_layer_summary(&path, &report()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("layer_id,step_cycles_total"));
        assert_eq!(lines[1], "1,100,10,20,5,7");
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_cache_summary_skipped_without_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache_summary.csv");
        append_cache_summary(&path, &report()).unwrap();
        assert!(!path.exists());
    }
}
