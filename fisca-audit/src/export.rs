//! Session exports
//!
//! Findings as semicolon-separated text for spreadsheets, whole sessions as JSON.

use crate::error::AuditResult;
use crate::models::{ResultatControle, SessionAudit};

pub const CSV_HEADER: &str = "Ref;Nom;Niveau;Statut;Severite;Message;Suggestion;Comptes;Reference";

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_line(finding: &ResultatControle) -> String {
    format!(
        "{};{};{};{};{};{};{};{};{}",
        finding.reference,
        quoted(&finding.nom),
        finding.niveau.value(),
        finding.statut,
        finding.severite,
        quoted(&finding.message),
        quoted(finding.suggestion.as_deref().unwrap_or_default()),
        quoted(&finding.comptes().join(", ")),
        quoted(finding.reference_reglementaire.as_deref().unwrap_or_default()),
    )
}

/// Findings as CSV, one line per finding in evaluation order
pub fn findings_to_csv(findings: &[ResultatControle]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + findings.len() * 96);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for finding in findings {
        out.push_str(&csv_line(finding));
        out.push('\n');
    }
    out
}

/// Pretty-printed session JSON
pub fn session_to_json(session: &SessionAudit) -> AuditResult<String> {
    Ok(serde_json::to_string_pretty(session)?)
}

/// Parse a session written by `session_to_json`
pub fn session_from_json(json: &str) -> AuditResult<SessionAudit> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetailsControle, Niveau, PhaseAudit, Severite};

    #[test]
    fn test_csv_quotes_text_fields() {
        let finding = ResultatControle::anomalie(
            "F-010",
            "Comptes d'attente",
            Niveau::Fondamental,
            Severite::Majeur,
            "Solde \"471\" non nul",
        )
        .with_details(DetailsControle::new().comptes(["471000", "472000"]))
        .with_suggestion("Solder les comptes d'attente");

        let csv = findings_to_csv(&[finding]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some(
                "F-010;\"Comptes d'attente\";1;ANOMALIE;MAJEUR;\"Solde \"\"471\"\" non nul\";\
                 \"Solder les comptes d'attente\";\"471000, 472000\";\"\""
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_one_line_per_finding() {
        let findings = vec![
            ResultatControle::ok("S-001", "Format", Niveau::Structurel, "ok"),
            ResultatControle::ok("S-002", "Doublons", Niveau::Structurel, "ok"),
        ];
        let csv = findings_to_csv(&findings);
        assert!(csv.ends_with('\n'));
        let refs: Vec<&str> = csv.lines().skip(1).map(|l| l.split(';').next().unwrap_or_default()).collect();
        assert_eq!(refs, vec!["S-001", "S-002"]);
    }

    #[test]
    fn test_session_json_is_readable_back() {
        let mut session = SessionAudit::new("bal-1", "2024", PhaseAudit::Phase1);
        session
            .resultats
            .push(ResultatControle::ok("S-001", "Format", Niveau::Structurel, "ok"));
        let json = session_to_json(&session).unwrap();
        assert!(json.contains("\"phase\": \"PHASE_1\""));
        let back = session_from_json(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.resultats, session.resultats);
    }
}
