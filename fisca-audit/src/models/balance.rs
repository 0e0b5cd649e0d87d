//! Trial balance lines

use serde::{Deserialize, Serialize};

/// One trial-balance line
///
/// `debit`/`credit` are period movements, `solde_debit`/`solde_credit` the
/// closing balances. Account codes carry hierarchical prefix semantics
/// (`401100` belongs to `401`, `40` and class `4`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub compte: String,
    #[serde(default)]
    pub intitule: String,
    #[serde(default)]
    pub debit: f64,
    #[serde(default)]
    pub credit: f64,
    #[serde(default)]
    pub solde_debit: f64,
    #[serde(default)]
    pub solde_credit: f64,
}

impl BalanceEntry {
    pub fn new(
        compte: impl Into<String>,
        intitule: impl Into<String>,
        debit: f64,
        credit: f64,
        solde_debit: f64,
        solde_credit: f64,
    ) -> Self {
        Self {
            compte: compte.into(),
            intitule: intitule.into(),
            debit,
            credit,
            solde_debit,
            solde_credit,
        }
    }

    /// Signed closing balance (debit balance minus credit balance)
    pub fn solde(&self) -> f64 {
        self.solde_debit - self.solde_credit
    }

    /// Opening balance implied by the closing balance and the period movements
    pub fn solde_ouverture(&self) -> f64 {
        self.solde() - (self.debit - self.credit)
    }

    /// Trimmed account code
    pub fn code(&self) -> &str {
        self.compte.trim()
    }

    /// Account class (first digit), `None` for empty or non-numeric codes
    pub fn classe(&self) -> Option<u8> {
        self.code()
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .map(|d| d as u8)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.code().starts_with(prefix)
    }

    pub fn has_any_prefix(&self, prefixes: &[&str]) -> bool {
        prefixes.iter().any(|p| self.has_prefix(p))
    }

    /// True when every amount on the line is zero
    pub fn is_zero(&self) -> bool {
        self.debit == 0.0 && self.credit == 0.0 && self.solde_debit == 0.0 && self.solde_credit == 0.0
    }
}

/// Aggregates over a slice of balance lines
pub trait BalanceExt {
    fn lines(&self) -> &[BalanceEntry];

    /// Sum of period debits
    fn total_debit(&self) -> f64 {
        self.lines().iter().map(|e| e.debit).sum()
    }

    /// Sum of period credits
    fn total_credit(&self) -> f64 {
        self.lines().iter().map(|e| e.credit).sum()
    }

    /// Signed closing balance summed over accounts starting with any prefix
    fn solde_prefixes(&self, prefixes: &[&str]) -> f64 {
        self.lines()
            .iter()
            .filter(|e| e.has_any_prefix(prefixes))
            .map(|e| e.solde())
            .sum()
    }

    /// Credit-minus-debit closing balance for accounts starting with any prefix
    fn solde_crediteur(&self, prefixes: &[&str]) -> f64 {
        -self.solde_prefixes(prefixes)
    }

    fn lines_with_prefix<'a>(&'a self, prefix: &'a str) -> Box<dyn Iterator<Item = &'a BalanceEntry> + 'a> {
        Box::new(self.lines().iter().filter(move |e| e.has_prefix(prefix)))
    }

    fn has_account_prefix(&self, prefix: &str) -> bool {
        self.lines().iter().any(|e| e.has_prefix(prefix))
    }

    fn find(&self, compte: &str) -> Option<&BalanceEntry> {
        self.lines().iter().find(|e| e.code() == compte)
    }
}

impl BalanceExt for [BalanceEntry] {
    fn lines(&self) -> &[BalanceEntry] {
        self
    }
}

impl BalanceExt for Vec<BalanceEntry> {
    fn lines(&self) -> &[BalanceEntry] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solde_and_classe() {
        let entry = BalanceEntry::new(" 601000", "Achats", 100.0, 0.0, 100.0, 0.0);
        assert_eq!(entry.solde(), 100.0);
        assert_eq!(entry.classe(), Some(6));
        assert!(entry.has_prefix("60"));
        assert_eq!(entry.solde_ouverture(), 0.0);
    }

    #[test]
    fn test_classe_of_non_numeric_code() {
        let entry = BalanceEntry::new("ABC", "", 0.0, 0.0, 0.0, 0.0);
        assert_eq!(entry.classe(), None);
        assert!(entry.is_zero());
    }

    #[test]
    fn test_aggregates() {
        let lines = vec![
            BalanceEntry::new("101000", "Capital", 0.0, 1000.0, 0.0, 1000.0),
            BalanceEntry::new("521000", "Banque", 1000.0, 0.0, 1000.0, 0.0),
        ];
        assert_eq!(lines.total_debit(), 1000.0);
        assert_eq!(lines.total_credit(), 1000.0);
        assert_eq!(lines.solde_crediteur(&["10"]), 1000.0);
        assert_eq!(lines.lines_with_prefix("52").count(), 1);
        assert!(lines.find("101000").is_some());
    }

    #[test]
    fn test_deserialize_with_missing_amounts() {
        let entry: BalanceEntry =
            serde_json::from_str(r#"{"compte":"411000","debit":5.0}"#).unwrap();
        assert_eq!(entry.debit, 5.0);
        assert_eq!(entry.solde_credit, 0.0);
        assert!(entry.intitule.is_empty());
    }
}
