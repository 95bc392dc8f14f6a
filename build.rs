use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn main() {
    println!("cargo:rustc-env=SITEAUDIT_BUILT_AT={}", chrono::Utc::now().to_rfc3339());
    if let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=SITEAUDIT_GIT_HASH={hash}");
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
}
