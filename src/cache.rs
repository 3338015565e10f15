use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::simulation::SimulationReport;

/// One persisted evaluation outcome.
///
/// In-band simulator failures are stored too, so a run's history is
/// visible on disk, but a stored failure is never served as a hit: the
/// next request for that vector re-runs the simulator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CachedOutcome {
    Report(String),
    Failed(String),
}

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    params: Vec<f64>,
    outcome: CachedOutcome,
}

/// Persistent memoization of simulator runs, keyed by the exact parameter
/// vector.
///
/// Keys compare bit-for-bit (`f64::to_bits`), so callers must construct
/// vectors deterministically: a value that drifted by one ulp is a
/// different design point and a fresh evaluation. The store grows without
/// bound on purpose — entries are bytes, re-evaluations are minutes.
///
/// One handle per run; two processes sharing a store file is an
/// unsupported configuration, not a guarded one.
pub struct EvalCache {
    path: PathBuf,
    entries: IndexMap<Vec<u64>, CachedOutcome>,
}

fn key_of(params: &[f64]) -> Vec<u64> {
    params.iter().map(|p| p.to_bits()).collect()
}

impl EvalCache {
    /// Open the store at `path`; a missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OptimizerError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => {
                let records: Vec<CacheRecord> = serde_json::from_str(&text)?;
                records
                    .into_iter()
                    .map(|r| (key_of(&r.params), r.outcome))
                    .collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => IndexMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `params`; on a miss — or a stored failure — run `compute`,
    /// store the outcome, and persist before returning. Process-level
    /// invocation errors propagate without being stored.
    pub fn get_or_compute<F>(
        &mut self,
        params: &[f64],
        mut compute: F,
    ) -> Result<SimulationReport, OptimizerError>
    where
        F: FnMut(&[f64]) -> Result<SimulationReport, OptimizerError>,
    {
        let key = key_of(params);
        if let Some(CachedOutcome::Report(text)) = self.entries.get(&key) {
            return Ok(SimulationReport::new(text.clone()));
        }

        let report = compute(params)?;
        let outcome = if report.failure().is_some() {
            CachedOutcome::Failed(report.text().to_string())
        } else {
            CachedOutcome::Report(report.text().to_string())
        };
        self.entries.insert(key, outcome);
        self.persist()?;
        Ok(report)
    }

    /// Whole-store rewrite: serialize to a sibling temp file, then rename
    /// it over the old store. A crash mid-write leaves the previous store
    /// intact; the rename is the commit point.
    fn persist(&self) -> Result<(), OptimizerError> {
        let records: Vec<CacheRecord> = self
            .entries
            .iter()
            .map(|(key, outcome)| CacheRecord {
                params: key.iter().map(|&bits| f64::from_bits(bits)).collect(),
                outcome: outcome.clone(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&records)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
