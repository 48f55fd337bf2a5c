//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use noderpc_config::Config;
use ortho_config::{OrthoConfig, OrthoError};

use crate::bootstrap::ConfigLoader;

/// Loader that yields a small, fast-draining configuration.
#[derive(Debug, Default)]
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            async_workers: 1,
            async_backlog: 4,
            shutdown_grace_ms: 500,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unknown CLI flag.
#[derive(Debug, Default)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("noderpcd"),
            OsString::from("--no-such-option"),
            OsString::from("value"),
        ];
        Config::load_from_iter(args)
    }
}
