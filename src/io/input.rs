use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use crate::geometry::VoxelPoint;

/// Detects whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    Ok(if tabs > commas { b'\t' } else { b',' })
}

/// One table row. Columns are matched by name, so a leading index column
/// written by other tools is ignored.
#[derive(Debug, Deserialize)]
struct AnnotationRow {
    #[serde(default)]
    t: Option<f64>,
    z: f64,
    y: f64,
    x: f64,
    id: i64,
}

/// Reads filaments from an annotation table with columns `[t,]z,y,x,id`.
///
/// Rows are grouped by `id`; filaments come back in the order their id is
/// first seen, points in row order.
pub fn read_annotations_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<VoxelPoint>>> {
    let path = path.as_ref();
    let delim = detect_delimiter(path)?;
    let file = File::open(path)
        .with_context(|| format!("failed to open annotation table {:?}", path))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delim)
        .from_reader(file);

    let mut order: HashMap<i64, usize> = HashMap::new();
    let mut filaments: Vec<Vec<VoxelPoint>> = Vec::new();
    for (line, result) in rdr.deserialize::<AnnotationRow>().enumerate() {
        let row = result.with_context(|| format!("bad row {} in {:?}", line + 1, path))?;
        let point = VoxelPoint {
            t: row.t,
            z: row.z,
            y: row.y,
            x: row.x,
        };
        if !point.is_finite() {
            bail!("row {} in {:?} has a non-finite coordinate", line + 1, path);
        }
        let slot = *order.entry(row.id).or_insert_with(|| {
            filaments.push(Vec::new());
            filaments.len() - 1
        });
        filaments[slot].push(point);
    }

    if filaments.is_empty() {
        warn!(path = ?path, "annotation table has no rows");
    }
    Ok(filaments)
}
