//! Embeds git commit and rustc version into the crate at compile time so
//! `version_info()` never reads process state at runtime.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=FORGE_GIT_COMMIT_HASH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let commit_hash = git_short_hash().unwrap_or_else(|| "0000000".to_owned());
    println!("cargo:rustc-env=GIT_COMMIT_HASH={commit_hash}");

    let rustc_version = rustc_version::version()
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "0.0.0".to_owned());
    println!("cargo:rustc-env=RUSTC_VERSION={rustc_version}");
}

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_owned())
}
