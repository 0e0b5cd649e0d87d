//! Build script for fisca-audit
//!
//! Exposes the git commit and build profile to the binary so audit logs
//! identify the engine build that produced them.

use std::process::Command;

fn main() {
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=FISCA_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=FISCA_BUILD_PROFILE={}", profile);
    println!("cargo:rerun-if-changed=build.rs");
}
