//! Append-only audit sinks
//!
//! Violation and correction records form an audit trail: write-once,
//! append-only, never rewritten and never read back for logic
//! decisions. The sink is injected rather than a process-wide
//! singleton so tests get isolated instances.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::types::{CorrectionRecord, ViolationRecord};

/// Destination for audit records. Implementations must preserve append
/// order; records are serialized with a stable field order.
pub trait AuditSink: Send + Sync {
    fn append_violation(&self, record: &ViolationRecord) -> Result<()>;
    fn append_correction(&self, record: &CorrectionRecord) -> Result<()>;
}

/// Durable sink writing one JSON record per line, suitable for
/// external monitoring to tail.
pub struct JsonlSink {
    violations: Mutex<BufWriter<File>>,
    corrections: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Open (or create) both log files in append mode.
    pub fn open(violations_path: &Path, corrections_path: &Path) -> Result<Self> {
        Ok(Self {
            violations: Mutex::new(BufWriter::new(Self::open_append(violations_path)?)),
            corrections: Mutex::new(BufWriter::new(Self::open_append(corrections_path)?)),
        })
    }

    fn open_append(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    fn write_line<T: serde::Serialize>(writer: &Mutex<BufWriter<File>>, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut guard = writer.lock();
        writeln!(guard, "{}", line)?;
        // Flush per record: the trail must survive the caller
        // discarding the answer
        guard.flush()?;
        Ok(())
    }
}

impl AuditSink for JsonlSink {
    fn append_violation(&self, record: &ViolationRecord) -> Result<()> {
        debug!(rule = %record.rule, severity = %record.severity, "violation appended");
        Self::write_line(&self.violations, record)
    }

    fn append_correction(&self, record: &CorrectionRecord) -> Result<()> {
        debug!(
            reason = %record.reason,
            attempt = record.attempt_index,
            "correction appended"
        );
        Self::write_line(&self.corrections, record)
    }
}

/// In-memory sink for tests and introspection
#[derive(Default)]
pub struct MemorySink {
    violations: Mutex<Vec<ViolationRecord>>,
    corrections: Mutex<Vec<CorrectionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn violations(&self) -> Vec<ViolationRecord> {
        self.violations.lock().clone()
    }

    pub fn corrections(&self) -> Vec<CorrectionRecord> {
        self.corrections.lock().clone()
    }

    /// Violations tallied per rule name
    pub fn violation_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in self.violations.lock().iter() {
            *counts.entry(record.rule.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl AuditSink for MemorySink {
    fn append_violation(&self, record: &ViolationRecord) -> Result<()> {
        self.violations.lock().push(record.clone());
        Ok(())
    }

    fn append_correction(&self, record: &CorrectionRecord) -> Result<()> {
        self.corrections.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CorrectionReason, Severity};
    use chrono::Utc;

    fn violation(rule: &str) -> ViolationRecord {
        ViolationRecord {
            answer_text: "offending text".into(),
            rule: rule.into(),
            severity: Severity::High,
            timestamp: Utc::now(),
        }
    }

    fn correction(attempt: u32) -> CorrectionRecord {
        CorrectionRecord {
            original_answer: "original".into(),
            revised_query: "revised".into(),
            reason: CorrectionReason::LowConfidence,
            attempt_index: attempt,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_jsonl_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("violations.jsonl");
        let cpath = dir.path().join("corrections.jsonl");
        let sink = JsonlSink::open(&vpath, &cpath).unwrap();

        sink.append_violation(&violation("content_safety")).unwrap();
        sink.append_violation(&violation("privacy")).unwrap();
        sink.append_correction(&correction(1)).unwrap();

        let vlines: Vec<String> = std::fs::read_to_string(&vpath)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(vlines.len(), 2);
        let first: ViolationRecord = serde_json::from_str(&vlines[0]).unwrap();
        assert_eq!(first.rule, "content_safety");

        let clines = std::fs::read_to_string(&cpath).unwrap();
        assert_eq!(clines.lines().count(), 1);
    }

    #[test]
    fn test_jsonl_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let vpath = dir.path().join("violations.jsonl");
        let cpath = dir.path().join("corrections.jsonl");

        {
            let sink = JsonlSink::open(&vpath, &cpath).unwrap();
            sink.append_violation(&violation("privacy")).unwrap();
        }
        {
            let sink = JsonlSink::open(&vpath, &cpath).unwrap();
            sink.append_violation(&violation("privacy")).unwrap();
        }

        let lines = std::fs::read_to_string(&vpath).unwrap();
        assert_eq!(lines.lines().count(), 2, "reopening must not truncate");
    }

    #[test]
    fn test_memory_sink_preserves_order_and_counts() {
        let sink = MemorySink::new();
        sink.append_violation(&violation("privacy")).unwrap();
        sink.append_violation(&violation("content_safety")).unwrap();
        sink.append_violation(&violation("privacy")).unwrap();
        sink.append_correction(&correction(1)).unwrap();
        sink.append_correction(&correction(2)).unwrap();

        assert_eq!(sink.violations().len(), 3);
        assert_eq!(sink.violation_counts()["privacy"], 2);
        let attempts: Vec<u32> = sink.corrections().iter().map(|c| c.attempt_index).collect();
        assert_eq!(attempts, vec![1, 2]);
    }
}
