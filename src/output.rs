use std::path::{Path, PathBuf};

use crate::chart::Chart;
use crate::error::{PipelineError, Result};

pub fn chart_path(charts_dir: &Path, sanitized_id: &str) -> PathBuf {
    charts_dir.join(format!("{}.json", sanitized_id))
}

pub fn midi_path(midi_dir: &Path, sanitized_id: &str) -> PathBuf {
    midi_dir.join(format!("{}.mid", sanitized_id))
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| PipelineError::io(path, e.into()))?;
    std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
}

pub fn write_chart(path: &Path, chart: &Chart) -> Result<()> {
    write_json(path, chart)?;
    log::info!("Wrote chart: {} (notes={})", path.display(), chart.notes.len());
    Ok(())
}
