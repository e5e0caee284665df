//! Fuzz target: `ControllerConfig::from_json`
//!
//! Arbitrary documents must either be rejected with a `ConfigError` or
//! produce a configuration that passes its own validation.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use beltctl::config::ControllerConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = ControllerConfig::from_json(text) {
        assert!(config.validate().is_ok());
        assert_ne!(config.topics.control, config.topics.status);
    }
});
