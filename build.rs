// build.rs

use std::env;

/// Stamps the version reported by `--version` and `/health`.
/// `LIVERESULT_VERSION` overrides the package version; non-release builds get a `-dev` suffix.
fn main() {
    let base = env::var("LIVERESULT_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env::var("CARGO_PKG_VERSION").ok())
        .unwrap_or_else(|| "0.0.0".to_string());
    let version = match env::var("PROFILE").as_deref() {
        Ok("release") => base,
        _ => format!("{base}-dev"),
    };

    println!("cargo:rustc-env=LIVERESULT_BUILD_VERSION={version}");
    println!("cargo:rerun-if-env-changed=LIVERESULT_VERSION");
    println!("cargo:rerun-if-changed=build.rs");
}
