//! Static SYSCOHADA reference data
//!
//! Consumed as lookup tables. Callers may supply their own chart or mapping
//! through the audit context; these are the defaults.

pub mod mapping;
pub mod plan;

pub use mapping::{MappingSyscohada, Poste, TotauxBilan};
pub use plan::{CompteComptable, PlanComptable, SensCompte};
