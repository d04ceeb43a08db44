// Exposes `git describe` to the binary as GIT_DESCRIBE, falling back to the package version

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let describe = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string()));

    println!("cargo:rustc-env=GIT_DESCRIBE={}", describe);
}
