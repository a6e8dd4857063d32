// Training history: one row per completed epoch

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_mae: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Epoch with the lowest validation loss (first one on ties)
    pub fn best(&self) -> Option<&EpochRecord> {
        self.records.iter().fold(None, |best: Option<&EpochRecord>, r| match best {
            Some(b) if b.val_loss <= r.val_loss => Some(b),
            _ => Some(r),
        })
    }

    /// Write as CSV with header `epoch,train_loss,val_loss,val_mae`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let records = reader
            .deserialize::<EpochRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(epoch: usize, val_loss: f64) -> EpochRecord {
        EpochRecord { epoch, train_loss: 1.0 / epoch as f64, val_loss, val_mae: val_loss / 2.0 }
    }

    #[test]
    fn test_best_epoch() {
        let mut history = TrainingHistory::default();
        assert!(history.best().is_none());
        history.push(record(1, 0.5));
        history.push(record(2, 0.25));
        history.push(record(3, 0.25));
        history.push(record(4, 0.75));
        assert_eq!(history.best().map(|r| r.epoch), Some(2));
    }

    #[test]
    fn test_csv_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");

        let mut history = TrainingHistory::default();
        history.push(record(1, 0.5));
        history.push(record(2, 0.25));
        history.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("epoch,train_loss,val_loss,val_mae"));
        assert_eq!(text.lines().count(), 3);
        assert_eq!(TrainingHistory::read_csv(&path).unwrap(), history);
    }
}
