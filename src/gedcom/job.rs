//! Resumable import job
//!
//! Carries everything needed to continue an interrupted import of the same
//! source: the minted ids and the records already created.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::GedcomError;

/// SHA-256 of the source text, hex encoded
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    fingerprint: String,
    /// GEDCOM pointer → minted aggregate id
    xref_map: BTreeMap<String, Uuid>,
    /// Record keys already turned into aggregates
    completed: BTreeSet<String>,
}

impl ImportJob {
    /// Fresh job for a source text
    pub fn new(text: &str) -> Self {
        Self {
            fingerprint: fingerprint(text),
            xref_map: BTreeMap::new(),
            completed: BTreeSet::new(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Reject a source that is not the one this job was started for
    pub fn verify_source(&self, text: &str) -> Result<(), GedcomError> {
        let actual = fingerprint(text);
        if actual != self.fingerprint {
            return Err(GedcomError::SourceMismatch {
                expected: self.fingerprint.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Id for a pointer, minting one on first sight
    pub fn mint(&mut self, xref: &str) -> Uuid {
        *self
            .xref_map
            .entry(xref.to_string())
            .or_insert_with(Uuid::new_v4)
    }

    pub fn resolve(&self, xref: &str) -> Option<Uuid> {
        self.xref_map.get(xref).copied()
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    pub fn mark_completed(&mut self, key: impl Into<String>) {
        self.completed.insert(key.into());
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_mint_is_stable() {
        let mut job = ImportJob::new("0 TRLR\n");
        let first = job.mint("I1");

        assert_eq!(job.mint("I1"), first);
        assert_eq!(job.resolve("I1"), Some(first));
        assert_eq!(job.resolve("I2"), None);
    }

    #[test]
    fn test_job_survives_serialization() {
        let mut job = ImportJob::new("0 TRLR\n");
        job.mint("I1");
        job.mark_completed("I1");

        let restored: ImportJob = serde_json::from_str(&serde_json::to_string(&job).unwrap()).unwrap();

        assert_eq!(restored, job);
        assert!(restored.is_completed("I1"));
    }

    #[test]
    fn test_other_source_is_rejected() {
        let job = ImportJob::new("0 TRLR\n");

        assert!(job.verify_source("0 TRLR\n").is_ok());
        assert!(matches!(
            job.verify_source("0 HEAD\n0 TRLR\n"),
            Err(GedcomError::SourceMismatch { .. })
        ));
    }
}
