//! Audit session state machine
//!
//! A session progresses `EN_ATTENTE → EN_COURS → {TERMINEE | ANNULEE | ERREUR}`.
//! Terminal states are absorbing.

use super::enums::{Niveau, PhaseAudit, Severite, StatutControle, StatutSession};
use super::finding::ResultatControle;
use crate::error::{AuditError, AuditResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: StatutSession,
    pub new_state: StatutSession,
    pub transitioned_at: DateTime<Utc>,
}

/// Progress tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    /// Level being evaluated (or last evaluated)
    pub niveau_courant: Niveau,

    /// 0-based index of the current control within its level
    pub controle_courant: usize,

    /// Active controls for the session's phase
    pub total_controles: usize,

    /// Controls evaluated so far
    pub controles_executes: usize,

    /// Percentage complete (0.0 - 100.0)
    pub pourcentage: f64,
}

impl Default for Progression {
    fn default() -> Self {
        Self {
            niveau_courant: Niveau::Structurel,
            controle_courant: 0,
            total_controles: 0,
            controles_executes: 0,
            pourcentage: 0.0,
        }
    }
}

/// Per-level counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeNiveau {
    pub total: usize,
    pub ok: usize,
    pub anomalies: usize,
}

/// Summary derived from a session's findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeAudit {
    pub total_controles: usize,
    pub par_severite: BTreeMap<Severite, usize>,
    pub par_niveau: BTreeMap<Niveau, ResumeNiveau>,
    /// 0-100
    pub score_global: u8,
    pub bloquants_restants: usize,
}

impl ResumeAudit {
    /// Compute the summary of a finding list
    ///
    /// `score = round(100 * (OK + NON_APPLICABLE) / total)`, capped at
    /// `blocking_ceiling` while any `BLOQUANT` anomaly remains. Empty lists score 0.
    pub fn from_findings(findings: &[ResultatControle], blocking_ceiling: u8) -> Self {
        let mut par_severite: BTreeMap<Severite, usize> =
            Severite::ALL.iter().map(|s| (*s, 0)).collect();
        let mut par_niveau: BTreeMap<Niveau, ResumeNiveau> = BTreeMap::new();
        let mut passing = 0usize;
        let mut bloquants = 0usize;

        for f in findings {
            *par_severite.entry(f.severite).or_insert(0) += 1;

            let niveau = par_niveau.entry(f.niveau).or_default();
            niveau.total += 1;
            match f.statut {
                StatutControle::Ok => {
                    niveau.ok += 1;
                    passing += 1;
                }
                StatutControle::NonApplicable => passing += 1,
                StatutControle::Anomalie => {
                    niveau.anomalies += 1;
                    if f.severite == Severite::Bloquant {
                        bloquants += 1;
                    }
                }
                StatutControle::ErreurExec => {}
            }
        }

        let total = findings.len();
        let mut score = if total == 0 {
            0
        } else {
            ((passing as f64 * 100.0) / total as f64).round() as u8
        };
        if bloquants > 0 {
            score = score.min(blocking_ceiling);
        }

        Self {
            total_controles: total,
            par_severite,
            par_niveau,
            score_global: score,
            bloquants_restants: bloquants,
        }
    }

    pub fn count(&self, severite: Severite) -> usize {
        self.par_severite.get(&severite).copied().unwrap_or(0)
    }
}

/// One audit execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAudit {
    pub id: Uuid,
    pub balance_id: String,
    pub exercice: String,
    pub phase: PhaseAudit,
    pub statut: StatutSession,
    pub date_debut: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_fin: Option<DateTime<Utc>>,
    pub progression: Progression,
    pub resultats: Vec<ResultatControle>,
    pub resume: ResumeAudit,
    /// Session-level fault message (status ERREUR)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erreur: Option<String>,
}

impl SessionAudit {
    /// Create new session in EN_ATTENTE
    pub fn new(balance_id: impl Into<String>, exercice: impl Into<String>, phase: PhaseAudit) -> Self {
        Self {
            id: Uuid::new_v4(),
            balance_id: balance_id.into(),
            exercice: exercice.into(),
            phase,
            statut: StatutSession::EnAttente,
            date_debut: Utc::now(),
            date_fin: None,
            progression: Progression::default(),
            resultats: Vec::new(),
            resume: ResumeAudit::default(),
            erreur: None,
        }
    }

    /// Transition to new state
    ///
    /// Rejects leaving a terminal state and skipping EN_COURS.
    pub fn transition_to(&mut self, new_state: StatutSession) -> AuditResult<StateTransition> {
        let allowed = match (self.statut, new_state) {
            (StatutSession::EnAttente, StatutSession::EnCours) => true,
            (StatutSession::EnCours, s) => s.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(AuditError::InvalidTransition {
                from: self.statut.to_string(),
                to: new_state.to_string(),
            });
        }

        let now = Utc::now();
        let transition = StateTransition {
            session_id: self.id,
            old_state: self.statut,
            new_state,
            transitioned_at: now,
        };
        self.statut = new_state;

        match new_state {
            StatutSession::EnCours => self.date_debut = now,
            s if s.is_terminal() => self.date_fin = Some(now),
            _ => {}
        }

        Ok(transition)
    }

    /// Record the control about to be evaluated
    pub fn set_current(&mut self, niveau: Niveau, index: usize) {
        self.progression.niveau_courant = niveau;
        self.progression.controle_courant = index;
    }

    /// Record one more evaluated control
    pub fn control_done(&mut self) {
        let p = &mut self.progression;
        p.controles_executes += 1;
        p.pourcentage = if p.total_controles > 0 {
            (p.controles_executes as f64 * 100.0) / p.total_controles as f64
        } else {
            0.0
        };
    }

    /// Recompute the summary from the current findings
    pub fn refresh_resume(&mut self, blocking_ceiling: u8) {
        self.resume = ResumeAudit::from_findings(&self.resultats, blocking_ceiling);
    }

    /// Findings of one level, in evaluation order
    pub fn findings_for_level(&self, niveau: Niveau) -> Vec<&ResultatControle> {
        self.resultats.iter().filter(|r| r.niveau == niveau).collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.statut.is_terminal()
    }
}
