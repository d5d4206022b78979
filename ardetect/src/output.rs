//! CSV and JSON writers for per-file results.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arcore::ArCandidate;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use track::Track;

use crate::error::PipelineError;
use crate::pipeline::BatchOutput;

/// Columns of the per-slice record table.
pub const RECORD_COLUMNS: [&str; 11] = [
    "id",
    "time",
    "centroid_lat",
    "centroid_lon",
    "area_km2",
    "length_km",
    "width_km",
    "orientation_angle_deg",
    "cross_flux",
    "relaxed",
    "mean_anomaly",
];

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Files written for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub records: PathBuf,
    pub tracks: PathBuf,
    pub labels: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            records: dir.join(format!("{stem}_records.csv")),
            tracks: dir.join(format!("{stem}_tracks.csv")),
            labels: dir.join(format!("{stem}_labels.json")),
        }
    }
}

/// Axis of one candidate with its per-vertex flux diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisRecord {
    pub time_index: usize,
    pub label: u32,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Degrees between axis tangent and flux at each vertex.
    pub angle: Vec<f64>,
    /// Flux along the tangent at each vertex.
    pub cross: Vec<f64>,
}

impl AxisRecord {
    pub fn from_candidate(c: &ArCandidate) -> Self {
        Self {
            time_index: c.key.time_index,
            label: c.label(),
            lat: c.axis.axis.iter().map(|p| p.lat).collect(),
            lon: c.axis.axis.iter().map(|p| p.lon).collect(),
            angle: c.axis.orientation_deviation.clone(),
            cross: c.axis.cross_flux_series.clone(),
        }
    }
}

/// Labeled raster as stored on disk, with the axes of the labeled
/// candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRaster {
    /// (time, lat, lon) extents.
    pub shape: Vec<usize>,
    /// Row-major labels.
    pub labels: Vec<u32>,
    #[serde(default)]
    pub axes: Vec<AxisRecord>,
}

impl LabelRaster {
    pub fn from_array(labels: &Array3<u32>) -> Self {
        Self {
            shape: labels.shape().to_vec(),
            labels: labels.iter().copied().collect(),
            axes: Vec::new(),
        }
    }

    /// Raster plus one axis record per candidate, in candidate order.
    pub fn from_output(labels: &Array3<u32>, candidates: &[Arc<ArCandidate>]) -> Self {
        Self {
            axes: candidates.iter().map(|c| AxisRecord::from_candidate(c)).collect(),
            ..Self::from_array(labels)
        }
    }

    /// Back to a (time, lat, lon) array; `None` if the shape does not match.
    pub fn into_array(self) -> Option<Array3<u32>> {
        match self.shape.as_slice() {
            &[nt, ny, nx] => Array3::from_shape_vec((nt, ny, nx), self.labels).ok(),
            _ => None,
        }
    }
}

fn write_record<W: Write>(w: &mut W, c: &ArCandidate) -> std::io::Result<()> {
    let centroid = c.centroid();
    write!(
        w,
        "{},{},{:.4},{:.4},{:.2},{:.2},{:.2},{:.4},{:.4},{},{:.4}",
        c.label(),
        c.time.format(TIME_FORMAT),
        centroid.lat,
        centroid.lon,
        c.area_km2(),
        c.length_km(),
        c.width_km(),
        c.axis.mean_orientation_deg,
        c.axis.cross_flux,
        c.relaxed,
        c.region.mean_anomaly
    )
}

/// Per-slice record table, one row per candidate.
pub fn write_records<W: Write>(w: &mut W, candidates: &[Arc<ArCandidate>]) -> std::io::Result<()> {
    writeln!(w, "{}", RECORD_COLUMNS.join(","))?;
    for c in candidates {
        write_record(w, c)?;
        writeln!(w)?;
    }
    Ok(())
}

/// Track table: `track_id` followed by the record columns, ordered by track
/// then time.
pub fn write_tracks<W: Write>(w: &mut W, tracks: &[Track]) -> std::io::Result<()> {
    writeln!(w, "track_id,{}", RECORD_COLUMNS.join(","))?;
    for track in tracks {
        for member in &track.members {
            write!(w, "{},", track.id)?;
            write_record(w, member)?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>, PipelineError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| PipelineError::io(path, e))
}

/// Write the record table, track table and label raster of one batch into
/// `dir`, named after `stem`.
pub fn write_outputs(dir: &Path, stem: &str, output: &BatchOutput) -> Result<OutputPaths, PipelineError> {
    let paths = OutputPaths::new(dir, stem);

    let mut w = create(&paths.records)?;
    write_records(&mut w, &output.candidates)
        .and_then(|_| w.flush())
        .map_err(|e| PipelineError::io(&paths.records, e))?;

    let mut w = create(&paths.tracks)?;
    write_tracks(&mut w, &output.tracks)
        .and_then(|_| w.flush())
        .map_err(|e| PipelineError::io(&paths.tracks, e))?;

    let mut w = create(&paths.labels)?;
    serde_json::to_writer(
        &mut w,
        &LabelRaster::from_output(&output.labels, &output.candidates),
    )
        .map_err(|e| PipelineError::json(&paths.labels, e))?;
    w.flush().map_err(|e| PipelineError::io(&paths.labels, e))?;

    log::info!(
        "wrote {}, {} and {}",
        paths.records.display(),
        paths.tracks.display(),
        paths.labels.display()
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcore::image_proc::detection::Region;
    use arcore::{AxisSummary, CandidateKey, GeoPoint};
    use test_helpers::synthetic::time_axis;

    fn candidate(time_index: usize, label: u32, relaxed: bool) -> Arc<ArCandidate> {
        let times = time_axis(4, 6);
        Arc::new(ArCandidate {
            key: CandidateKey { time_index, label },
            time: times[time_index],
            region: Region {
                cells: vec![(0, 0)],
                unwrapped_cols: vec![0],
                area_km2: 12345.678,
                centroid: GeoPoint::new(37.5, 359.25),
                mean_anomaly: 310.5,
            },
            points: vec![GeoPoint::new(37.5, 359.25)],
            axis: AxisSummary {
                length_km: 2500.0,
                width_km: 400.0,
                lw_ratio: 6.25,
                mean_orientation_deg: 12.5,
                cross_flux: 250.25,
                axis: vec![GeoPoint::new(37.0, 358.0), GeoPoint::new(38.0, 360.5)],
                orientation_deviation: vec![10.0, 15.0],
                cross_flux_series: vec![240.5, 260.0],
                ..Default::default()
            },
            relaxed,
        })
    }

    #[test]
    fn test_record_rows() {
        let mut buf = Vec::new();
        write_records(&mut buf, &[candidate(1, 2, true)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], RECORD_COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "2,2000-01-01T06:00:00,37.5000,359.2500,12345.68,2500.00,400.00,12.5000,250.2500,true,310.5000"
        );
    }

    #[test]
    fn test_track_rows_follow_members() {
        let tracks = vec![
            Track::new(1, vec![candidate(0, 1, false), candidate(1, 1, false)]),
            Track::new(3, vec![candidate(2, 4, false)]),
        ];
        let mut buf = Vec::new();
        write_tracks(&mut buf, &tracks).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("track_id,id,time"));
        assert!(lines[1].starts_with("1,1,2000-01-01T00:00:00"));
        assert!(lines[2].starts_with("1,1,2000-01-01T06:00:00"));
        assert!(lines[3].starts_with("3,4,2000-01-01T12:00:00"));
    }

    #[test]
    fn test_label_raster_round_trip() {
        let mut labels = Array3::<u32>::zeros((2, 3, 4));
        labels[[1, 2, 3]] = 7;
        let raster = LabelRaster::from_array(&labels);
        assert_eq!(raster.shape, vec![2, 3, 4]);
        assert_eq!(raster.labels[23], 7);
        assert_eq!(raster.into_array().unwrap(), labels);

        let bad = LabelRaster {
            shape: vec![2, 2],
            labels: vec![0; 4],
            axes: Vec::new(),
        };
        assert!(bad.into_array().is_none());
    }

    #[test]
    fn test_label_raster_carries_axis_series() {
        let labels = Array3::<u32>::zeros((4, 1, 1));
        let raster = LabelRaster::from_output(&labels, &[candidate(3, 2, false)]);
        assert_eq!(raster.axes.len(), 1);
        let record = &raster.axes[0];
        assert_eq!((record.time_index, record.label), (3, 2));
        assert_eq!(record.lon, vec![358.0, 360.5]);
        assert_eq!(record.angle, vec![10.0, 15.0]);
        assert_eq!(record.cross, vec![240.5, 260.0]);

        let json = serde_json::to_string(&raster).unwrap();
        assert!(json.contains("\"angle\":[10.0,15.0]"));
        let back: LabelRaster = serde_json::from_str(&json).unwrap();
        assert_eq!(back, raster);

        // rasters without axes still load
        let bare: LabelRaster = serde_json::from_str(r#"{ "shape": [1, 1, 1], "labels": [0] }"#).unwrap();
        assert!(bare.axes.is_empty());
    }
}
