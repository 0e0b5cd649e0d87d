//! Data models for fisca-audit
//!
//! - Balance lines and archived audits (inputs)
//! - Findings, sessions and comparison reports (outputs)

pub mod archive;
pub mod balance;
pub mod enums;
pub mod finding;
pub mod report;
pub mod session;

pub use archive::{ArchiveAudit, BalanceSnapshot};
pub use balance::{BalanceEntry, BalanceExt};
pub use enums::{Niveau, PhaseAudit, Severite, StatutControle, StatutSession};
pub use finding::{
    count_by_severite, DetailsControle, EcritureCorrective, LigneEcriture, ResultatControle, Sens,
};
pub use report::{
    CompteModifie, CorrectionItem, Evolution, EvolutionPartie2, Partie2Item, RapportCorrection,
    RapportPartie2, SyntheseCorrection, SynthesePartie2,
};
pub use session::{Progression, ResumeAudit, ResumeNiveau, SessionAudit, StateTransition};
