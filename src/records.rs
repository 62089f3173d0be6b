//! Buffered records: weights captured on lid close and scanned barcodes.
//!
//! Presence in the record store means "not yet uploaded"; the sync
//! reconciler deletes a record once the home server has accepted it.
//! Field names on the wire follow the home-server API
//! (`weight`, `weight_raw`, `barcode`).

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique record identifier.
pub type RecordId = Uuid;

/// Which buffer a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Weight,
    Barcode,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weight => write!(f, "weight"),
            Self::Barcode => write!(f, "barcode"),
        }
    }
}

/// One weighing taken when the lid closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    /// Filtered average of the raw samples (after offset).
    #[serde(rename = "weight_raw")]
    pub raw_value: f64,
    /// Calibrated, tared weight.
    #[serde(rename = "weight")]
    pub calibrated_value: f64,
}

impl WeightRecord {
    pub fn new(raw_value: f64, calibrated_value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            raw_value,
            calibrated_value,
        }
    }
}

/// One decoded barcode that could not be delivered straight away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedCode {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "barcode")]
    pub code: String,
}

impl ScannedCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            code: code.into(),
        }
    }
}

/// A buffered record of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Weight(WeightRecord),
    Barcode(ScannedCode),
}

impl Record {
    pub fn id(&self) -> RecordId {
        match self {
            Self::Weight(w) => w.id,
            Self::Barcode(b) => b.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Weight(_) => RecordKind::Weight,
            Self::Barcode(_) => RecordKind::Barcode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_wire_names() {
        let w = WeightRecord::new(1200.0, 35.5);
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["weight"], 35.5);
        assert_eq!(json["weight_raw"], 1200.0);
        assert!(json.get("id").is_some());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn barcode_wire_names() {
        let c = ScannedCode::new("012345678905");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["barcode"], "012345678905");
    }

    #[test]
    fn fresh_ids_are_unique() {
        let a = ScannedCode::new("x");
        let b = ScannedCode::new("x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn record_reports_kind() {
        assert_eq!(Record::Weight(WeightRecord::new(0.0, 0.0)).kind(), RecordKind::Weight);
        assert_eq!(Record::Barcode(ScannedCode::new("a")).kind(), RecordKind::Barcode);
    }
}
