//! Batch envelope and boundary validation

use crate::record::item::{ItemRecord, ValidItem};
use crate::{QuoteError, ValidationError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// One supplier's scraped batch, as handed over for ingestion
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope {
    pub supplier: String,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_items: Option<u32>,
    pub items: Vec<ItemRecord>,
}

/// A batch that passed boundary validation
///
/// `declared_total` keeps the count the collaborator announced, which may be
/// larger than `items.len()` when records were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub supplier: String,
    pub processed_at: DateTime<Utc>,
    pub declared_total: u32,
    pub items: Vec<ValidItem>,
    pub skipped: usize,
}

impl BatchEnvelope {
    /// Creates an envelope stamped with the current time
    pub fn new(supplier: &str, items: Vec<ItemRecord>) -> Self {
        Self {
            supplier: supplier.to_string(),
            processed_at: Some(Utc::now()),
            total_items: None,
            items,
        }
    }

    /// Validates the envelope and every record in it
    ///
    /// Fails on an empty supplier, an empty item list, or a record with
    /// invalid numbers. Records without a product code are counted as skipped.
    pub fn validate(&self) -> Result<ValidatedBatch, ValidationError> {
        let supplier = self.supplier.trim();
        if supplier.is_empty() {
            return Err(ValidationError::EmptySupplier);
        }

        if self.items.is_empty() {
            return Err(ValidationError::EmptyBatch(supplier.to_string()));
        }

        let mut items = Vec::with_capacity(self.items.len());
        let mut skipped = 0;
        for record in &self.items {
            match record.validate()? {
                Some(item) => items.push(item),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                "Skipping {} record(s) without a product code from {}",
                skipped,
                supplier
            );
        }

        let declared_total = self
            .total_items
            .unwrap_or_else(|| u32::try_from(self.items.len()).unwrap_or(u32::MAX));

        Ok(ValidatedBatch {
            supplier: supplier.to_string(),
            processed_at: self.processed_at.unwrap_or_else(Utc::now),
            declared_total,
            items,
            skipped,
        })
    }
}

/// A batch file holds either one envelope or an array of them
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    One(BatchEnvelope),
    Many(Vec<BatchEnvelope>),
}

/// Reads the envelopes stored in a JSON batch file
pub fn read_envelopes(path: &Path) -> Result<Vec<BatchEnvelope>, QuoteError> {
    let content = std::fs::read_to_string(path)?;
    let envelopes = match serde_json::from_str::<BatchFile>(&content)? {
        BatchFile::One(envelope) => vec![envelope],
        BatchFile::Many(envelopes) => envelopes,
    };

    tracing::debug!(
        "Read {} batch(es) from {}",
        envelopes.len(),
        path.display()
    );

    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_counts_skipped_records() {
        let envelope = BatchEnvelope::new(
            "roles",
            vec![
                ItemRecord::priced("A1", dec!(10.0)),
                ItemRecord::default(),
                ItemRecord::priced("B2", dec!(5.0)),
            ],
        );

        let batch = envelope.validate().unwrap();
        assert_eq!(batch.supplier, "roles");
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.declared_total, 3);
    }

    #[test]
    fn test_declared_total_is_preserved() {
        let mut envelope = BatchEnvelope::new("roles", vec![ItemRecord::priced("A1", dec!(10.0))]);
        envelope.total_items = Some(40);

        let batch = envelope.validate().unwrap();
        assert_eq!(batch.declared_total, 40);
    }

    #[test]
    fn test_empty_supplier_is_rejected() {
        let envelope = BatchEnvelope::new("  ", vec![ItemRecord::priced("A1", dec!(10.0))]);
        assert_eq!(envelope.validate(), Err(ValidationError::EmptySupplier));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let envelope = BatchEnvelope::new("dpk", vec![]);
        assert_eq!(
            envelope.validate(),
            Err(ValidationError::EmptyBatch("dpk".to_string()))
        );
    }

    #[test]
    fn test_deserialize_envelope() {
        let json = r#"{
            "supplier": "takao",
            "processedAt": "2026-01-19T14:29:19Z",
            "totalItems": 2,
            "items": [
                {"productCode": "A1", "unitPrice": 3.0},
                {"status": "Não encontrado"}
            ]
        }"#;

        let envelope: BatchEnvelope = serde_json::from_str(json).unwrap();
        let batch = envelope.validate().unwrap();

        assert_eq!(batch.processed_at.to_rfc3339(), "2026-01-19T14:29:19+00:00");
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn test_read_envelopes_single_and_array() {
        let dir = tempfile::TempDir::new().unwrap();

        let single = dir.path().join("roles.json");
        std::fs::write(
            &single,
            r#"{"supplier": "roles", "items": [{"productCode": "A1", "unitPrice": 1.0}]}"#,
        )
        .unwrap();
        let envelopes = read_envelopes(&single).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].supplier, "roles");

        let many = dir.path().join("all.json");
        std::fs::write(
            &many,
            r#"[
                {"supplier": "roles", "items": [{"productCode": "A1"}]},
                {"supplier": "dpk", "items": [{"productCode": "A1"}]}
            ]"#,
        )
        .unwrap();
        let envelopes = read_envelopes(&many).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[1].supplier, "dpk");
    }

    #[test]
    fn test_read_envelopes_accepts_fractional_quantities() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dpk.json");
        std::fs::write(
            &path,
            r#"[
                {"supplier": "dpk", "items": [
                    {"productCode": "A1", "unitPrice": 12.9, "qtyAvailable": 1.0},
                    {"productCode": "B2", "unitPrice": 0.0, "qtyAvailable": 0.0}
                ]},
                {"supplier": "roles", "items": [
                    {"productCode": "A1", "unitPrice": 11.5, "qtyAvailable": 100.0,
                     "regions": [{"regionCode": "SP", "price": 11.5, "qtyAvailable": 100.0}]}
                ]}
            ]"#,
        )
        .unwrap();

        let envelopes = read_envelopes(&path).unwrap();
        assert_eq!(envelopes.len(), 2);

        let dpk = envelopes[0].validate().unwrap();
        assert_eq!(dpk.items.len(), 2);
        assert_eq!(dpk.items[0].qty_available, 1.0);

        let roles = envelopes[1].validate().unwrap();
        assert_eq!(roles.items[0].regions[0].qty_available, 100.0);
    }

    #[test]
    fn test_read_envelopes_rejects_bad_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"supplier\": ").unwrap();

        assert!(matches!(read_envelopes(&path), Err(QuoteError::Json(_))));
    }
}
