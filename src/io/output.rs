use anyhow::{bail, Context};
use csv::WriterBuilder;
use std::path::Path;
use tracing::info;

use crate::geometry::VoxelPoint;

/// Writes filaments as a table with columns `[t,]z,y,x,id`, one row per
/// point. The `t` column is present when the first point carries a time
/// coordinate, and then every point must carry one.
pub fn write_annotations_csv<P: AsRef<Path>>(
    filaments: &[Vec<VoxelPoint>],
    path: P,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Could not create output directory: {:?}", parent))?;
    }

    let with_time = filaments
        .iter()
        .flatten()
        .next()
        .is_some_and(|p| p.t.is_some());

    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to create annotation table {:?}", path))?;

    let header: &[&str] = if with_time {
        &["t", "z", "y", "x", "id"]
    } else {
        &["z", "y", "x", "id"]
    };
    wtr.write_record(header)?;

    for (id, filament) in filaments.iter().enumerate() {
        for point in filament {
            let mut record = Vec::with_capacity(5);
            match (with_time, point.t) {
                (true, Some(t)) => record.push(t.to_string()),
                (false, None) => {}
                _ => bail!("filament {id} mixes points with and without a time coordinate"),
            }
            record.extend([point.z, point.y, point.x].map(|v| v.to_string()));
            record.push(id.to_string());
            wtr.write_record(&record)?;
        }
    }
    wtr.flush()?;

    info!(filaments = filaments.len(), path = ?path, "wrote annotations");
    Ok(())
}
