//! Archived audits of prior exercises
//!
//! Opaque inputs for level 8 continuity controls. Where archives are stored
//! is up to the host application.

use super::balance::{BalanceEntry, BalanceExt};
use super::session::SessionAudit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Frozen copy of a balance with its totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub id: Uuid,
    pub balance_id: String,
    pub date: DateTime<Utc>,
    pub lignes: Vec<BalanceEntry>,
    pub total_debit: f64,
    pub total_credit: f64,
    /// SHA-256 over the lines (codes, labels, amounts)
    pub hash: String,
}

impl BalanceSnapshot {
    pub fn new(balance_id: impl Into<String>, lignes: Vec<BalanceEntry>) -> Self {
        let total_debit = lignes.total_debit();
        let total_credit = lignes.total_credit();
        let hash = Self::compute_hash(&lignes);
        Self {
            id: Uuid::new_v4(),
            balance_id: balance_id.into(),
            date: Utc::now(),
            lignes,
            total_debit,
            total_credit,
            hash,
        }
    }

    /// Hash of the lines in their stored order
    pub fn compute_hash(lignes: &[BalanceEntry]) -> String {
        let mut hasher = Sha256::new();
        for ligne in lignes {
            hasher.update(ligne.compte.as_bytes());
            hasher.update([0u8]);
            hasher.update(ligne.intitule.as_bytes());
            hasher.update([0u8]);
            for amount in [ligne.debit, ligne.credit, ligne.solde_debit, ligne.solde_credit] {
                hasher.update(amount.to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// True when lines and totals still match what was archived
    pub fn is_intact(&self) -> bool {
        self.hash == Self::compute_hash(&self.lignes)
            && (self.lignes.total_debit() - self.total_debit).abs() < 0.005
            && (self.lignes.total_credit() - self.total_credit).abs() < 0.005
    }
}

/// Archived audit of one exercise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveAudit {
    pub id: Uuid,
    pub exercice: String,
    pub date_archivage: DateTime<Utc>,
    pub session: SessionAudit,
    pub snapshot: BalanceSnapshot,
}

impl ArchiveAudit {
    /// Archive a completed session together with the balance it audited
    pub fn from_session(session: SessionAudit, lignes: Vec<BalanceEntry>) -> Self {
        let snapshot = BalanceSnapshot::new(session.balance_id.clone(), lignes);
        Self {
            id: Uuid::new_v4(),
            exercice: session.exercice.clone(),
            date_archivage: Utc::now(),
            session,
            snapshot,
        }
    }

    /// Exercise as a year, when numeric
    pub fn annee(&self) -> Option<i32> {
        self.exercice.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhaseAudit;

    #[test]
    fn test_archive_from_session_computes_totals() {
        let session = SessionAudit::new("bal-2023", "2023", PhaseAudit::Phase1);
        let lignes = vec![
            BalanceEntry::new("101000", "Capital", 0.0, 500.0, 0.0, 500.0),
            BalanceEntry::new("521000", "Banque", 500.0, 0.0, 500.0, 0.0),
        ];
        let archive = ArchiveAudit::from_session(session, lignes);
        assert_eq!(archive.exercice, "2023");
        assert_eq!(archive.annee(), Some(2023));
        assert_eq!(archive.snapshot.balance_id, "bal-2023");
        assert_eq!(archive.snapshot.total_debit, 500.0);
        assert_eq!(archive.snapshot.total_credit, 500.0);
        assert_eq!(archive.snapshot.hash.len(), 64);
        assert!(archive.snapshot.is_intact());
    }

    #[test]
    fn test_tampered_snapshot_detected() {
        let session = SessionAudit::new("bal-2023", "2023", PhaseAudit::Phase1);
        let lignes = vec![BalanceEntry::new("101000", "Capital", 0.0, 500.0, 0.0, 500.0)];
        let mut archive = ArchiveAudit::from_session(session, lignes);
        archive.snapshot.lignes[0].solde_credit = 600.0;
        assert!(!archive.snapshot.is_intact());
    }
}
