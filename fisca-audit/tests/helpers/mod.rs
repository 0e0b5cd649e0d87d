//! Shared fixtures for the audit integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use fisca_audit::models::{BalanceEntry, Niveau, PhaseAudit, ResultatControle, SessionAudit, Severite};
use fisca_audit::AuditContext;

/// Fixed evaluation instant so finding timestamps are reproducible
pub fn evaluated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap()
}

pub fn line(compte: &str, intitule: &str, debit: f64, credit: f64) -> BalanceEntry {
    let solde = debit - credit;
    BalanceEntry::new(
        compte,
        intitule,
        debit,
        credit,
        solde.max(0.0),
        (-solde).max(0.0),
    )
}

/// Small balanced trial balance (27 000 000 on each side)
pub fn balance() -> Vec<BalanceEntry> {
    vec![
        line("101000", "Capital social", 0.0, 10_000_000.0),
        line("401000", "Fournisseurs", 3_000_000.0, 5_000_000.0),
        line("411000", "Clients", 4_000_000.0, 0.0),
        line("521000", "Banque", 12_000_000.0, 3_000_000.0),
        line("601000", "Achats de marchandises", 8_000_000.0, 0.0),
        line("701000", "Ventes de marchandises", 0.0, 9_000_000.0),
    ]
}

/// Same balance with `delta` added to the bank debit movement only
pub fn balance_with_debit_gap(delta: f64) -> Vec<BalanceEntry> {
    balance()
        .into_iter()
        .map(|mut l| {
            if l.compte == "521000" {
                l.debit += delta;
            }
            l
        })
        .collect()
}

pub fn context(lines: Vec<BalanceEntry>) -> AuditContext {
    AuditContext::builder(lines)
        .exercice("2024")
        .evaluated_at(evaluated_at())
        .build()
}

pub fn finding(reference: &str, severite: Severite) -> ResultatControle {
    if severite == Severite::Ok {
        ResultatControle::ok(reference, reference, Niveau::Fondamental, "ok")
    } else {
        ResultatControle::anomalie(reference, reference, Niveau::Fondamental, severite, "anomalie")
    }
}

/// Completed-looking session holding the given findings
pub fn session_with(findings: Vec<ResultatControle>) -> SessionAudit {
    let mut session = SessionAudit::new("balance", "2024", PhaseAudit::Phase1);
    session.resultats = findings;
    session.refresh_resume(49);
    session
}
