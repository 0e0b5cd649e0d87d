//! Shared helpers for control evaluators

use super::ControlMeta;
use crate::error::ControlError;
use crate::models::{BalanceEntry, DetailsControle, ResultatControle, Severite};

/// Evaluator return type
pub type Findings = Result<Vec<ResultatControle>, ControlError>;

/// Wrap a single finding
pub fn one(finding: ResultatControle) -> Findings {
    Ok(vec![finding])
}

/// Format an amount with French grouping (`1 234 567` or `1 234,50`)
pub fn fmt_montant(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u128;
    let units = cents / 100;
    let frac = cents % 100;

    let digits = units.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }

    let sign = if negative && cents > 0 { "-" } else { "" };
    if frac == 0 {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{},{:02}", sign, grouped, frac)
    }
}

/// Percentage with one decimal
pub fn fmt_pct(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Reject non-finite intermediate results
pub fn ensure_finite(label: &str, value: f64) -> Result<f64, ControlError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ControlError::Computation(format!("{} is not finite", label)))
    }
}

/// Expected balance side for the sign checks of level 3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensAttendu {
    Debiteur,
    Crediteur,
}

/// Accounts under `prefix` (minus `exclus`) whose closing balance contradicts
/// the expected side by more than `tolerance`
pub fn comptes_sens_inverse<'a>(
    balance: &'a [BalanceEntry],
    prefix: &str,
    exclus: &[&str],
    sens: SensAttendu,
    tolerance: f64,
) -> Vec<&'a BalanceEntry> {
    balance
        .iter()
        .filter(|e| e.has_prefix(prefix) && !e.has_any_prefix(exclus))
        .filter(|e| match sens {
            SensAttendu::Debiteur => e.solde() < -tolerance,
            SensAttendu::Crediteur => e.solde() > tolerance,
        })
        .collect()
}

/// Generic sign check producing one finding for a group of accounts
pub fn controle_sens(
    meta: &ControlMeta,
    balance: &[BalanceEntry],
    prefix: &str,
    exclus: &[&str],
    sens: SensAttendu,
    tolerance: f64,
    libelle_groupe: &str,
) -> ResultatControle {
    let inverses = comptes_sens_inverse(balance, prefix, exclus, sens, tolerance);
    if inverses.is_empty() {
        return meta.ok(format!("{}: sens des soldes conforme", libelle_groupe));
    }

    let (attendu, constate) = match sens {
        SensAttendu::Debiteur => ("debiteur", "crediteur"),
        SensAttendu::Crediteur => ("crediteur", "debiteur"),
    };
    let total: f64 = inverses.iter().map(|e| e.solde().abs()).sum();
    meta.anomalie(
        Severite::Mineur,
        format!(
            "{}: {} compte(s) a solde {} (attendu {})",
            libelle_groupe,
            inverses.len(),
            constate,
            attendu
        ),
    )
    .with_details(
        DetailsControle::new()
            .comptes(inverses.iter().take(10).map(|e| e.code().to_string()))
            .montant("totalInverse", total)
            .attendu(format!("Solde {}", attendu))
            .constate(format!("Solde {}", constate)),
    )
    .with_suggestion(format!(
        "Verifier les ecritures des comptes {} et reclasser les soldes {}s",
        prefix, constate
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Niveau, StatutControle};

    #[test]
    fn test_fmt_montant() {
        assert_eq!(fmt_montant(0.0), "0");
        assert_eq!(fmt_montant(500000.0), "500 000");
        assert_eq!(fmt_montant(8500000.0), "8 500 000");
        assert_eq!(fmt_montant(-1234.5), "-1 234,50");
        assert_eq!(fmt_montant(0.004), "0");
    }

    #[test]
    fn test_controle_sens() {
        const META: ControlMeta = ControlMeta::new("SS-001", "Immobilisations", Niveau::SensMontants);
        let balance = vec![
            BalanceEntry::new("241000", "Materiel", 0.0, 0.0, 0.0, 50.0),
            BalanceEntry::new("245000", "Vehicules", 0.0, 0.0, 100.0, 0.0),
            BalanceEntry::new("284500", "Amort. vehicules", 0.0, 0.0, 0.0, 40.0),
        ];
        let exclus = ["28", "29"];
        let f = controle_sens(&META, &balance, "2", &exclus, SensAttendu::Debiteur, 1.0, "Immobilisations");
        assert_eq!(f.statut, StatutControle::Anomalie);
        assert_eq!(f.comptes(), &["241000".to_string()]);

        let f = controle_sens(&META, &balance[1..], "2", &exclus, SensAttendu::Debiteur, 1.0, "Immobilisations");
        assert!(f.is_ok());
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite("x", f64::NAN).is_err());
        assert_eq!(ensure_finite("x", 2.0).unwrap(), 2.0);
    }
}
