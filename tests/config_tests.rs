//! Layered configuration loading: defaults, base file, environment file, env vars.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use workflow_orchestrator::config::{ConfigManager, ConfigurationError, EngineConfig};
use workflow_orchestrator::{InMemoryActivityRegistry, InMemoryRunStore, OrchestrationEngine, RecordingDispatcher};

fn config_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

#[test]
fn test_missing_files_fall_back_to_defaults() {
    let dir = config_dir(&[]);
    let manager =
        ConfigManager::load_layered(Some(dir.path().to_path_buf()), "development", "CFGTEST_EMPTY")
            .unwrap();

    assert_eq!(*manager.config(), EngineConfig::default());
    assert_eq!(manager.environment(), "development");
    assert_eq!(manager.config_directory(), dir.path());
    assert!(!manager.is_test_environment());
}

#[test]
fn test_environment_file_overrides_base_file() {
    let dir = config_dir(&[
        (
            "workflow.toml",
            r#"
step_budget = 500
max_steps_per_tick = 20

[retry]
max_attempts = 5
base_delay_ms = 250

[circuit_breaker]
enabled = true

[circuit_breaker.activity_overrides.charge_card]
failure_threshold = 2
timeout_ms = 5000
success_threshold = 1
"#,
        ),
        (
            "test.toml",
            r#"
max_steps_per_tick = 5

[retry]
base_delay_ms = 10
"#,
        ),
    ]);

    let manager =
        ConfigManager::load_layered(Some(dir.path().to_path_buf()), "test", "CFGTEST_FILES").unwrap();
    let config = manager.config();

    assert!(manager.is_test_environment());
    assert_eq!(config.step_budget, 500);
    assert_eq!(config.max_steps_per_tick, 5);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_ms, 10);
    // Untouched keys keep their defaults
    assert_eq!(config.retry.multiplier, 2.0);
    assert_eq!(config.worker.max_concurrent_ticks, 16);

    assert!(config.circuit_breaker.enabled);
    let charge = config.circuit_breaker.thresholds_for("charge_card");
    assert_eq!(charge.failure_threshold, 2);
    assert_eq!(config.circuit_breaker.thresholds_for("send_email").failure_threshold, 5);
}

#[test]
fn test_environment_variables_override_files() {
    let dir = config_dir(&[("workflow.toml", "step_budget = 500\n\n[retry]\nmax_attempts = 5\n")]);
    std::env::set_var("CFGTEST_ENV__RETRY__MAX_ATTEMPTS", "7");
    std::env::set_var("CFGTEST_ENV__STEP_BUDGET", "42");

    let result =
        ConfigManager::load_layered(Some(dir.path().to_path_buf()), "staging", "CFGTEST_ENV");
    std::env::remove_var("CFGTEST_ENV__RETRY__MAX_ATTEMPTS");
    std::env::remove_var("CFGTEST_ENV__STEP_BUDGET");

    let manager = result.unwrap();
    assert_eq!(manager.config().retry.max_attempts, 7);
    assert_eq!(manager.config().step_budget, 42);
}

#[test]
fn test_invalid_values_are_rejected_at_load() {
    let dir = config_dir(&[("workflow.toml", "max_steps_per_tick = 0\n")]);
    let error =
        ConfigManager::load_layered(Some(dir.path().to_path_buf()), "development", "CFGTEST_INVALID")
            .unwrap_err();
    assert!(matches!(error, ConfigurationError::InvalidValue { .. }));

    let dir = config_dir(&[("workflow.toml", "[retry]\nmultiplier = 0.5\n")]);
    assert!(ConfigManager::load_layered(
        Some(dir.path().to_path_buf()),
        "development",
        "CFGTEST_INVALID"
    )
    .is_err());
}

#[test]
fn test_malformed_file_is_a_load_error() {
    let dir = config_dir(&[("workflow.toml", "step_budget = \"lots\"\n")]);
    let error =
        ConfigManager::load_layered(Some(dir.path().to_path_buf()), "development", "CFGTEST_MALFORMED")
            .unwrap_err();
    assert!(matches!(error, ConfigurationError::Load(_)));
}

#[test]
fn test_repository_config_files_load() {
    let config_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
    for environment in ["development", "test", "production"] {
        let manager =
            ConfigManager::load_layered(Some(config_dir.clone()), environment, "CFGTEST_REPO").unwrap();
        assert_eq!(manager.environment(), environment);
    }

    let test = ConfigManager::load_layered(Some(config_dir), "test", "CFGTEST_REPO").unwrap();
    assert!(!test.config().circuit_breaker.enabled);
    assert_eq!(test.config().retry.base_delay_ms, 10);
}

#[test]
fn test_loaded_config_builds_an_engine() {
    let dir = config_dir(&[("workflow.toml", "[retry]\nmax_attempts = 4\n")]);
    let manager =
        ConfigManager::load_layered(Some(dir.path().to_path_buf()), "test", "CFGTEST_ENGINE").unwrap();

    let engine = OrchestrationEngine::builder(
        std::sync::Arc::new(InMemoryRunStore::new()),
        std::sync::Arc::new(RecordingDispatcher::new()),
        std::sync::Arc::new(InMemoryActivityRegistry::new()),
    )
    .config(manager.config().clone())
    .build()
    .unwrap();
    assert_eq!(engine.config().retry.max_attempts, 4);
}
