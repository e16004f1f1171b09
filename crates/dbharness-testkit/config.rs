//! Test-run configuration
//!
//! Image overrides come from the environment so a CI matrix can pin
//! different server versions without touching code:
//! `DBHARNESS_IMAGE_<ENGINE>=image:tag`, e.g.
//! `DBHARNESS_IMAGE_POSTGRES=postgres:15.7`.

use std::sync::Once;

use dbharness_containers::{EngineKind, EngineProfile};
use tracing_subscriber::EnvFilter;

/// Image override for an engine, from `DBHARNESS_IMAGE_<ENGINE>`.
pub fn image_override(engine: EngineKind) -> Option<(String, String)> {
    let var = format!("DBHARNESS_IMAGE_{}", engine.as_str().to_uppercase());
    let value = std::env::var(&var).ok()?;
    match value.rsplit_once(':') {
        Some((image, tag)) if !image.is_empty() && !tag.is_empty() => {
            tracing::info!(%var, %value, "using image override");
            Some((image.to_string(), tag.to_string()))
        }
        _ => {
            tracing::warn!(%var, %value, "ignoring malformed image override, expected image:tag");
            None
        }
    }
}

/// Apply any environment override to a profile.
pub fn apply_image_override(profile: EngineProfile) -> EngineProfile {
    match image_override(profile.engine) {
        Some((image, tag)) => profile.with_image(image).with_tag(tag),
        None => profile,
    }
}

/// Initialize tracing once per test process.
///
/// Honors `RUST_LOG`; defaults to `info` plus debug output for the
/// harness's own crates.
pub fn tracing_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,dbharness=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
