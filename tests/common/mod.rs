//! Common test utilities for midimap.
//!
//! - `env`: Serialized environment variable overrides
//! - `fixtures`: Temporary profile documents and settings files
#![allow(dead_code)]

pub mod env;
pub mod fixtures;

use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
