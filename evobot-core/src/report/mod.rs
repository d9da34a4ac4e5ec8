//! Metric series
//! ---
//!
//! The run loop emits a handful of named values once per epoch.  The
//! [`Reporter`] buffers them into series and persists the lot as JSON on
//! demand.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use hashbrown::HashMap;
use log::warn;

/// One buffered series of per-epoch values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Series {
    /// Scalar per epoch.
    Scalar(Vec<f32>),
    /// `(x, y)` coordinate per epoch.
    Point(Vec<(i32, i32)>),
}

/// Buffers named per-epoch series until persisted.
#[derive(Default)]
pub struct Reporter {
    series: HashMap<String, Series>,
}

impl Reporter {
    /// An empty reporter.
    pub fn new() -> Reporter {
        Reporter {
            series: HashMap::new(),
        }
    }

    /// Appends a scalar to the named series.
    pub fn put(&mut self, key: &str, value: f32) {
        let entry = self
            .series
            .entry(key.to_string())
            .or_insert_with(|| Series::Scalar(Vec::new()));
        match entry {
            Series::Scalar(values) => values.push(value),
            Series::Point(_) => warn!("series {} holds points, dropping scalar {}", key, value),
        }
    }

    /// Appends a coordinate to the named series.
    pub fn put_point(&mut self, key: &str, point: (i32, i32)) {
        let entry = self
            .series
            .entry(key.to_string())
            .or_insert_with(|| Series::Point(Vec::new()));
        match entry {
            Series::Point(points) => points.push(point),
            Series::Scalar(_) => warn!("series {} holds scalars, dropping point", key),
        }
    }

    /// The named series, if any values were recorded.
    pub fn get(&self, key: &str) -> Option<&Series> {
        self.series.get(key)
    }

    /// Number of recorded epochs in the named series.
    pub fn len(&self, key: &str) -> usize {
        match self.series.get(key) {
            Some(Series::Scalar(values)) => values.len(),
            Some(Series::Point(points)) => points.len(),
            None => 0,
        }
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Writes every series as a JSON object, keys sorted.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let sorted: BTreeMap<&String, &Series> = self.series.iter().collect();
        serde_json::to_writer_pretty(writer, &sorted)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Persists every series to the given path.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        self.write(&mut file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_buffering() {
        let mut reporter = Reporter::new();
        reporter.put("max", 0.5);
        reporter.put("max", 0.7);
        reporter.put("avg", 0.2);
        reporter.put_point("start_pos", (10, 20));

        assert_eq!(reporter.len("max"), 2);
        assert_eq!(reporter.len("avg"), 1);
        assert_eq!(reporter.len("start_pos"), 1);
        assert_eq!(reporter.len("missing"), 0);
        assert_eq!(
            reporter.get("max"),
            Some(&Series::Scalar(vec![0.5, 0.7]))
        );
    }

    #[test]
    fn test_kind_mismatch_is_dropped() {
        let mut reporter = Reporter::new();
        reporter.put("max", 0.5);
        reporter.put_point("max", (1, 2));
        assert_eq!(reporter.get("max"), Some(&Series::Scalar(vec![0.5])));
    }

    #[test]
    fn test_json_round_trip() {
        let mut reporter = Reporter::new();
        reporter.put("max", 1.5);
        reporter.put("max", 2.5);
        reporter.put_point("start_pos", (3, -4));

        let mut buffer = Vec::new();
        reporter.write(&mut buffer).unwrap();
        let parsed: BTreeMap<String, Series> = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["max"], Series::Scalar(vec![1.5, 2.5]));
        assert_eq!(parsed["start_pos"], Series::Point(vec![(3, -4)]));
    }
}
