//! Run manifests and reports
//!
//! Three YAML records travel through the system:
//! - the per-run backup manifest (`gpdbbr_<T>_jobinfo.yaml` in the object
//!   store), written once at the end of a backup and immutable afterwards;
//! - the restore report (`gpdbbr_<T>_report` under the coordinator data
//!   directory), one per replayed backup;
//! - the row-check report (`rowcheck_<T>_report`), written only when a
//!   discrepancy survives the tolerance rule.
//!
//! Field names are part of the wire format and must not change.

pub mod layout;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for manifest serialization and IO
pub type ManifestResult<T> = Result<T, ManifestError>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to serialize {0}: {1}")]
    Serialize(&'static str, serde_yaml::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(&'static str, serde_yaml::Error),

    #[error("failed to write {0}: {1}")]
    Io(String, std::io::Error),
}

/// Terminal status of a backup run.
///
/// `Warning` marks a run with per-table failures; a warning manifest is
/// terminal and refuses to be chained onto by the next incremental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Warning,
}

/// Terminal status of a restore run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub status: JobStatus,
    pub dbname: String,
    pub begintime: String,
    pub endtime: String,
}

/// One table whose data bytes were physically copied this run.
///
/// `attributestring` is the exact quoted, attribute-order-preserving column
/// list used in the COPY statement; restore replays it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub name: String,
    pub oid: u32,
    pub attributestring: String,
}

/// Change-detection state for one append-optimized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoTableState {
    pub modcount: i64,
    pub lastddltime: String,
}

/// Change-detection state for one heap table: the maximum relfile mtime
/// observed across coordinator and segments, in integer seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapTableState {
    pub maxstat: i64,
}

/// Per-family change-detection state keyed by quoted `schema.table`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncrementalMetadata {
    #[serde(default)]
    pub ao: BTreeMap<String, AoTableState>,
    #[serde(default)]
    pub heap: BTreeMap<String, HeapTableState>,
}

/// The per-run job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub jobinfo: JobInfo,
    #[serde(default)]
    pub dataentries: Vec<DataEntry>,
    #[serde(default)]
    pub ddls: Vec<String>,
    pub incrementalmetadata: IncrementalMetadata,
    #[serde(default)]
    pub failtables: Vec<String>,
    #[serde(default)]
    pub userlist: Vec<String>,
    #[serde(default)]
    pub tablerows: BTreeMap<String, f64>,
}

impl BackupManifest {
    /// An empty manifest stamped with the run's begin time. Accumulators are
    /// filled in by the orchestrator; `seal` fixes the status.
    pub fn begin(dbname: &str, begintime: &str) -> Self {
        Self {
            jobinfo: JobInfo {
                status: JobStatus::Success,
                dbname: dbname.to_string(),
                begintime: begintime.to_string(),
                endtime: String::new(),
            },
            dataentries: Vec::new(),
            ddls: Vec::new(),
            incrementalmetadata: IncrementalMetadata::default(),
            failtables: Vec::new(),
            userlist: Vec::new(),
            tablerows: BTreeMap::new(),
        }
    }

    /// Fix the terminal status and end time. `status == warning` iff any
    /// table failed.
    pub fn seal(&mut self, endtime: &str) {
        self.jobinfo.status = if self.failtables.is_empty() {
            JobStatus::Success
        } else {
            JobStatus::Warning
        };
        self.jobinfo.endtime = endtime.to_string();
    }

    pub fn to_yaml(&self) -> ManifestResult<String> {
        serde_yaml::to_string(self).map_err(|e| ManifestError::Serialize("backup manifest", e))
    }

    pub fn from_yaml(data: &[u8]) -> ManifestResult<Self> {
        serde_yaml::from_slice(data).map_err(|e| ManifestError::Parse("backup manifest", e))
    }

    pub fn write_file(&self, path: &Path) -> ManifestResult<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|e| ManifestError::Io(path.display().to_string(), e))
    }
}

/// The local record of one replayed backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub status: RestoreStatus,
    pub begintime: String,
    pub endtime: String,
    #[serde(default)]
    pub failtables: Vec<String>,
    #[serde(default)]
    pub failddl: Vec<String>,
}

impl RestoreReport {
    pub fn begin(begintime: &str) -> Self {
        Self {
            status: RestoreStatus::Success,
            begintime: begintime.to_string(),
            endtime: String::new(),
            failtables: Vec::new(),
            failddl: Vec::new(),
        }
    }

    /// Fix the terminal status. `status == failed` iff any table or DDL
    /// statement failed to apply.
    pub fn seal(&mut self, endtime: &str) {
        self.status = if self.failtables.is_empty() && self.failddl.is_empty() {
            RestoreStatus::Success
        } else {
            RestoreStatus::Failed
        };
        self.endtime = endtime.to_string();
    }

    pub fn to_yaml(&self) -> ManifestResult<String> {
        serde_yaml::to_string(self).map_err(|e| ManifestError::Serialize("restore report", e))
    }

    pub fn from_yaml(data: &[u8]) -> ManifestResult<Self> {
        serde_yaml::from_slice(data).map_err(|e| ManifestError::Parse("restore report", e))
    }

    pub fn write_file(&self, path: &Path) -> ManifestResult<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|e| ManifestError::Io(path.display().to_string(), e))
    }
}

/// One table whose restored row estimate disagrees with the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRow {
    pub tabname: String,
    pub bkrow: f64,
    pub dbrow: f64,
}

/// Row-check findings; empty on a clean check (and then never written).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowCheckReport {
    #[serde(default)]
    pub onlybk: Vec<String>,
    #[serde(default)]
    pub onlydb: Vec<String>,
    #[serde(default)]
    pub diffrow: Vec<DiffRow>,
}

impl RowCheckReport {
    pub fn is_clean(&self) -> bool {
        self.onlybk.is_empty() && self.onlydb.is_empty() && self.diffrow.is_empty()
    }

    pub fn to_yaml(&self) -> ManifestResult<String> {
        serde_yaml::to_string(self).map_err(|e| ManifestError::Serialize("row-check report", e))
    }

    pub fn write_file(&self, path: &Path) -> ManifestResult<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|e| ManifestError::Io(path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> BackupManifest {
        let mut m = BackupManifest::begin("sales", "20250301120000000");
        m.dataentries.push(DataEntry {
            name: "public.t".into(),
            oid: 16384,
            attributestring: "\"id\", \"name\"".into(),
        });
        m.incrementalmetadata.ao.insert(
            "s.a".into(),
            AoTableState {
                modcount: 7,
                lastddltime: "20250301115900000".into(),
            },
        );
        m.incrementalmetadata
            .heap
            .insert("public.t".into(), HeapTableState { maxstat: 1740800000 });
        m.userlist.push("gpadmin".into());
        m.tablerows.insert("public.t".into(), 100.0);
        m.seal("20250301120500000");
        m
    }

    #[test]
    fn test_manifest_yaml_roundtrip() {
        let m = sample_manifest();
        let yaml = m.to_yaml().unwrap();
        let parsed = BackupManifest::from_yaml(yaml.as_bytes()).unwrap();

        assert_eq!(parsed.jobinfo.status, JobStatus::Success);
        assert_eq!(parsed.jobinfo.dbname, "sales");
        assert_eq!(parsed.dataentries, m.dataentries);
        assert_eq!(parsed.incrementalmetadata.ao["s.a"].modcount, 7);
        assert_eq!(parsed.incrementalmetadata.heap["public.t"].maxstat, 1740800000);
        assert_eq!(parsed.tablerows["public.t"], 100.0);
    }

    #[test]
    fn test_manifest_wire_field_names() {
        let yaml = sample_manifest().to_yaml().unwrap();

        for field in [
            "jobinfo:",
            "status: success",
            "dbname: sales",
            "begintime:",
            "endtime:",
            "dataentries:",
            "name: public.t",
            "oid: 16384",
            "attributestring:",
            "ddls: []",
            "incrementalmetadata:",
            "ao:",
            "modcount: 7",
            "lastddltime:",
            "heap:",
            "maxstat: 1740800000",
            "failtables: []",
            "userlist:",
            "tablerows:",
        ] {
            assert!(yaml.contains(field), "missing {:?} in:\n{}", field, yaml);
        }
    }

    #[test]
    fn test_seal_sets_warning_iff_failures() {
        let mut m = BackupManifest::begin("sales", "20250301120000000");
        m.seal("20250301120500000");
        assert_eq!(m.jobinfo.status, JobStatus::Success);

        m.failtables.push("s.x".into());
        m.seal("20250301120600000");
        assert_eq!(m.jobinfo.status, JobStatus::Warning);
    }

    #[test]
    fn test_empty_collections_roundtrip() {
        let mut m = BackupManifest::begin("sales", "20250301120000000");
        m.seal("20250301120500000");

        let yaml = m.to_yaml().unwrap();
        let parsed = BackupManifest::from_yaml(yaml.as_bytes()).unwrap();

        assert!(parsed.dataentries.is_empty());
        assert!(parsed.userlist.is_empty());
        assert!(parsed.tablerows.is_empty());
        assert!(parsed.incrementalmetadata.ao.is_empty());
        assert!(parsed.incrementalmetadata.heap.is_empty());
    }

    #[test]
    fn test_missing_optional_sections_parse() {
        let yaml = "jobinfo:\n  status: success\n  dbname: sales\n  begintime: '1'\n  endtime: '2'\nincrementalmetadata: {}\n";
        let parsed = BackupManifest::from_yaml(yaml.as_bytes()).unwrap();
        assert!(parsed.dataentries.is_empty());
        assert!(parsed.failtables.is_empty());
    }

    #[test]
    fn test_restore_report_seal() {
        let mut r = RestoreReport::begin("20250301130000000");
        r.seal("20250301130200000");
        assert_eq!(r.status, RestoreStatus::Success);

        r.failddl.push("ALTER TABLE s.a SET TABLESPACE tsb".into());
        r.seal("20250301130300000");
        assert_eq!(r.status, RestoreStatus::Failed);

        let yaml = r.to_yaml().unwrap();
        assert!(yaml.contains("status: failed"));
        assert!(yaml.contains("failddl:"));
    }

    #[test]
    fn test_rowcheck_report_clean() {
        let report = RowCheckReport::default();
        assert!(report.is_clean());

        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("onlybk: []"));
        assert!(yaml.contains("onlydb: []"));
        assert!(yaml.contains("diffrow: []"));
    }
}
