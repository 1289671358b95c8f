//! # chanswap-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`Settings::default()`]
//! 2. **Settings file**: `~/.chanswap/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `CHANSWAP_*` overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(settings.store.backend, StoreBackend::Json);
        assert_eq!(settings.store.path, "tvshows.json");
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
    }
}
