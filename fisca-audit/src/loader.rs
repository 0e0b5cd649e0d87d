//! JSON file loading for balances, sessions and archives
//!
//! Archives live one per file (`<exercice>.json`) in a directory.

use crate::error::AuditResult;
use crate::models::{ArchiveAudit, BalanceEntry, SessionAudit};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn read_json<T: DeserializeOwned>(path: &Path) -> AuditResult<T> {
    let content = fs::read_to_string(path).map_err(fisca_common::Error::from)?;
    Ok(serde_json::from_str(&content)?)
}

/// Balance lines from a JSON array
pub fn load_balance(path: &Path) -> AuditResult<Vec<BalanceEntry>> {
    let lines: Vec<BalanceEntry> = read_json(path)?;
    debug!(path = %path.display(), lines = lines.len(), "Balance loaded");
    Ok(lines)
}

pub fn load_session(path: &Path) -> AuditResult<SessionAudit> {
    read_json(path)
}

/// Every readable archive of a directory, ordered by exercise
///
/// Unreadable files are skipped with a warning. A missing directory yields
/// no archive.
pub fn load_archives(dir: &Path) -> AuditResult<Vec<ArchiveAudit>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "Archive directory not found");
        return Ok(Vec::new());
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(dir).map_err(fisca_common::Error::from)? {
        let path = entry.map_err(fisca_common::Error::from)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_json::<ArchiveAudit>(&path) {
            Ok(archive) => archives.push(archive),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable archive"),
        }
    }
    archives.sort_by(|a, b| a.exercice.cmp(&b.exercice));
    debug!(dir = %dir.display(), archives = archives.len(), "Archives loaded");
    Ok(archives)
}

/// Write an archive as `<dir>/<exercice>.json`, replacing any previous one
pub fn store_archive(dir: &Path, archive: &ArchiveAudit) -> AuditResult<PathBuf> {
    fs::create_dir_all(dir).map_err(fisca_common::Error::from)?;
    let path = dir.join(format!("{}.json", archive.exercice.trim()));
    let json = serde_json::to_string_pretty(archive)?;
    fs::write(&path, json).map_err(fisca_common::Error::from)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhaseAudit;
    use tempfile::TempDir;

    fn archive(exercice: &str) -> ArchiveAudit {
        let session = SessionAudit::new("bal", exercice, PhaseAudit::Phase1);
        ArchiveAudit::from_session(
            session,
            vec![BalanceEntry::new("101000", "Capital", 0.0, 100.0, 0.0, 100.0)],
        )
    }

    #[test]
    fn test_archives_round_trip_through_directory() {
        let dir = TempDir::new().unwrap();
        store_archive(dir.path(), &archive("2023")).unwrap();
        store_archive(dir.path(), &archive("2021")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let archives = load_archives(dir.path()).unwrap();
        let years: Vec<&str> = archives.iter().map(|a| a.exercice.as_str()).collect();
        assert_eq!(years, vec!["2021", "2023"]);
        assert!(archives.iter().all(|a| a.snapshot.is_intact()));
    }

    #[test]
    fn test_missing_archive_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load_archives(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_load_balance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("balance.json");
        fs::write(
            &path,
            r#"[{"compte":"521000","intitule":"Banque","debit":10.0,"credit":0.0,"solde_debit":10.0,"solde_credit":0.0}]"#,
        )
        .unwrap();
        let lines = load_balance(&path).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].solde(), 10.0);

        assert!(load_balance(&dir.path().join("missing.json")).is_err());
    }
}
