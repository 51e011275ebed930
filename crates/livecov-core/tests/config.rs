//! Environment overrides of the collector configuration.

use std::env;
use std::path::PathBuf;

use livecov_core::config::{LOAD_BASELINE_VAR, RUNTIME_ABI_VAR, TEMP_DIR_VAR};
use livecov_core::{CollectorConfig, CoverageError, RuntimeAbi};

// One test only: the variables are process-wide.
#[test]
fn test_from_env_overrides()
{
    env::set_var(TEMP_DIR_VAR, "/var/tmp/livecov-windows");
    env::set_var(RUNTIME_ABI_VAR, "llvm17");
    env::set_var(LOAD_BASELINE_VAR, "off");

    let config = CollectorConfig::from_env().unwrap();
    assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/livecov-windows"));
    assert_eq!(config.runtime_abi, RuntimeAbi::Llvm17);
    assert!(!config.load_baseline);
    assert_eq!(config.profile_variable, "LLVM_PROFILE_FILE");

    env::set_var(TEMP_DIR_VAR, "");
    env::set_var(RUNTIME_ABI_VAR, "LLVM19");
    env::remove_var(LOAD_BASELINE_VAR);
    let config = CollectorConfig::from_env().unwrap();
    assert_eq!(config.temp_dir, env::temp_dir());
    assert_eq!(config.runtime_abi, RuntimeAbi::Llvm19);
    assert!(config.load_baseline);

    env::set_var(RUNTIME_ABI_VAR, "llvm12");
    assert!(CollectorConfig::from_env().is_err());

    env::set_var(RUNTIME_ABI_VAR, "llvm19");
    env::set_var(LOAD_BASELINE_VAR, "sometimes");
    assert!(matches!(CollectorConfig::from_env(), Err(CoverageError::InvalidConfig(_))));

    env::remove_var(TEMP_DIR_VAR);
    env::remove_var(RUNTIME_ABI_VAR);
    env::remove_var(LOAD_BASELINE_VAR);
}
