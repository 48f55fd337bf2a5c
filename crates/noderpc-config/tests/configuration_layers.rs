use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::rstest;

use noderpc_config::{Config, DEFAULT_ASYNC_BACKLOG, DEFAULT_ASYNC_WORKERS, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &str) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe under edition 2024; the mutex keeps
        // the override exclusive and `Drop` restores the previous value.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

fn load(args: &[&str]) -> Config {
    let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
    let argv = std::iter::once("noderpcd")
        .chain(args.iter().copied())
        .map(OsString::from);
    Config::load_from_iter(argv).expect("configuration should load")
}

#[test]
fn bare_invocation_uses_defaults() {
    let config = load(&[]);
    assert_eq!(config.async_workers(), DEFAULT_ASYNC_WORKERS);
    assert_eq!(config.async_backlog(), DEFAULT_ASYNC_BACKLOG);
}

#[rstest]
#[case(&["--async-workers", "8"], 8, DEFAULT_ASYNC_BACKLOG)]
#[case(&["--async-backlog", "16"], DEFAULT_ASYNC_WORKERS, 16)]
#[case(&["--async-workers", "2", "--async-backlog", "3"], 2, 3)]
fn cli_flags_override_defaults(
    #[case] args: &[&str],
    #[case] workers: usize,
    #[case] backlog: usize,
) {
    let config = load(args);
    assert_eq!(config.async_workers(), workers);
    assert_eq!(config.async_backlog(), backlog);
}

#[test]
fn cli_flag_selects_log_format() {
    let config = load(&["--log-format", "compact"]);
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[test]
fn environment_overrides_defaults() {
    let config = {
        let _override = EnvOverride::set_var("NODERPC_ASYNC_BACKLOG", "7");
        Config::load_from_iter([OsString::from("noderpcd")]).expect("configuration should load")
    };
    assert_eq!(config.async_backlog(), 7);
}
