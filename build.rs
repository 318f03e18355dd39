//! Stamps `--version` with the short commit hash when built from a git checkout.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok());
    if let Some(hash) = hash.as_deref().map(str::trim).filter(|hash| !hash.is_empty()) {
        println!("cargo:rustc-env=SCENECAST_GIT_HASH={hash}");
    }
}
