use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;

use crate::errors::EngineError;
use crate::metrics::{CustomEventRecord, EndMetrics, StepMetrics};

const HEX_SUFFIX_LEN: usize = 7;

/// Writes one run's artifacts to its own timestamped directory:
/// `step_metrics.csv`, `end_metrics.csv`, one CSV per custom-event kind,
/// and a text log. Configured once per run; nothing about it is mutated
/// mid-run, unlike a monkey-patched logger.
///
/// The run-directory's timestamp and random suffix come from wall-clock
/// time and `rand::thread_rng`, never from the simulation's seeded RNG, so
/// artifact naming never perturbs a run's numeric determinism.
pub struct ResultWriter {
    run_dir: PathBuf,
}

impl ResultWriter {
    /// Creates `{results_dir}/{YYYYmmddTHHMMSS}-{name}-{7 hex chars}` and
    /// returns a writer rooted there. `name` must not contain `-`, since
    /// the directory name is split on it when a run is later located by
    /// its prefix.
    pub fn new(results_dir: &Path, name: &str) -> Result<Self, EngineError> {
        if name.contains('-') {
            return Err(EngineError::InvalidRunName(name.to_string()));
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let suffix = random_hex_suffix();
        let run_dir = results_dir.join(format!("{stamp}-{name}-{suffix}"));
        std::fs::create_dir_all(&run_dir).map_err(|source| EngineError::Io {
            path: run_dir.display().to_string(),
            source,
        })?;
        Ok(Self { run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn write_step_metrics(&self, rows: &[StepMetrics]) -> Result<(), EngineError> {
        self.write_csv("step_metrics.csv", rows)
    }

    pub fn write_end_metrics(&self, rows: &[EndMetrics]) -> Result<(), EngineError> {
        self.write_csv("end_metrics.csv", rows)
    }

    /// One CSV per distinct event kind, e.g. `cycle_end.csv`.
    pub fn write_custom_events(&self, rows: &[CustomEventRecord]) -> Result<(), EngineError> {
        let mut by_kind: BTreeMap<&str, Vec<&CustomEventRecord>> = BTreeMap::new();
        for row in rows {
            by_kind.entry(row.kind.as_str()).or_default().push(row);
        }
        for (kind, events) in by_kind {
            self.write_csv(&format!("{kind}.csv"), &events)?;
        }
        Ok(())
    }

    pub fn write_log(&self, text: &str) -> Result<(), EngineError> {
        let path = self.run_dir.join("run.log");
        std::fs::write(&path, text).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_csv<T: serde::Serialize>(&self, filename: &str, rows: &[T]) -> Result<(), EngineError> {
        let path = self.run_dir.join(filename);
        let mut writer = csv::Writer::from_path(&path).map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        for row in rows {
            writer.serialize(row).map_err(|e| EngineError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;
        }
        writer.flush().map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

fn random_hex_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..HEX_SUFFIX_LEN).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    #[test]
    fn rejects_names_containing_a_hyphen() {
        let dir = std::env::temp_dir().join(format!("lendsim-result-test-{}", std::process::id()));
        let err = ResultWriter::new(&dir, "my-run").unwrap_err();
        assert!(matches!(err, EngineError::InvalidRunName(_)));
    }

    #[test]
    fn writes_step_and_end_metrics_csvs() {
        let dir = std::env::temp_dir().join(format!("lendsim-result-test-ok-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let writer = ResultWriter::new(&dir, "myrun").unwrap();

        assert!(writer.run_dir().file_name().unwrap().to_string_lossy().contains("myrun"));

        let metrics = Metrics::new();
        writer.write_step_metrics(&[]).unwrap();
        writer.write_end_metrics(&metrics.end_of_simulation()).unwrap();
        writer.write_custom_events(&[]).unwrap();
        writer.write_log("hello").unwrap();

        assert!(writer.run_dir().join("step_metrics.csv").exists());
        assert!(writer.run_dir().join("end_metrics.csv").exists());
        assert!(writer.run_dir().join("run.log").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn groups_custom_events_into_one_csv_per_kind() {
        let dir = std::env::temp_dir().join(format!("lendsim-result-test-events-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let writer = ResultWriter::new(&dir, "myrun").unwrap();

        let events = vec![
            CustomEventRecord {
                time: 0,
                kind: "cycle_end".to_string(),
                message: "cycle ended".to_string(),
                extra_json: "{}".to_string(),
            },
            CustomEventRecord {
                time: 10,
                kind: "create_lending_pool".to_string(),
                message: "created".to_string(),
                extra_json: "{}".to_string(),
            },
        ];
        writer.write_custom_events(&events).unwrap();
        assert!(writer.run_dir().join("cycle_end.csv").exists());
        assert!(writer.run_dir().join("create_lending_pool.csv").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
