//! Audit ledger - append-only JSONL file
//!
//! One JSON-serialized [`AuditRecord`] per line. Lines are only ever appended.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use riskwatch_core::AuditRecord;

use crate::error::AuditResult;
use crate::sink::AuditSink;

pub struct AuditLedger {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLedger {
    /// Open (or create) a ledger at the given path
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append a record and flush
    pub fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let json = serde_json::to_string(record)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{}", json)?;
        file.flush()?;
        Ok(())
    }

    /// Read every record back, skipping blank lines
    pub fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditSink for AuditLedger {
    fn name(&self) -> &str {
        "jsonl_ledger"
    }

    async fn write(&self, record: &AuditRecord) -> AuditResult<()> {
        self.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("audit.jsonl");

        let r1 = AuditRecord::new("block_ip", "ip_reputation", "1.2.3.4", Utc::now());
        let r2 = AuditRecord::new("validate_transaction", "transaction", "TX-1", Utc::now())
            .failed("amount must be positive");

        {
            let ledger = AuditLedger::open(&path).unwrap();
            ledger.append(&r1).unwrap();
            ledger.append(&r2).unwrap();
        }

        let ledger = AuditLedger::open(&path).unwrap();
        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, r1.id);
        assert!(!records[1].success);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for i in 0..3 {
            let ledger = AuditLedger::open(&path).unwrap();
            ledger
                .append(&AuditRecord::new("a", "r", format!("{}", i), Utc::now()))
                .unwrap();
        }

        let ledger = AuditLedger::open(&path).unwrap();
        let ids: Vec<String> = ledger
            .read_all()
            .unwrap()
            .into_iter()
            .map(|r| r.resource_id)
            .collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }
}
