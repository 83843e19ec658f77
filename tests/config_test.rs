use launchq::config::Config;

// Single test so the env mutations don't race each other under the parallel
// test runner.
#[test]
fn config_from_env_loads_validates_and_defaults() {
    unsafe {
        std::env::remove_var("LAUNCHQ_REGISTRY");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("LAUNCHQ_REGISTRY", "/tmp/launchq-test.db");
        std::env::set_var("LAUNCHQ_MAX_CONCURRENT", "8");
        std::env::set_var("LAUNCHQ_POLL_SECS", "5");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.registry_path, "/tmp/launchq-test.db");
    assert_eq!(config.max_concurrent, 8);
    assert_eq!(config.poll_interval.as_secs(), 5);
    assert!(!config.overwrite_existing);
    assert_eq!(config.poll_retry_budget, 3);
    assert!(!config.log_level.is_empty());

    let launcher = config.launcher();
    assert_eq!(launcher.max_concurrent, 8);
    assert_eq!(launcher.poll_interval.as_secs(), 5);

    // Zero ceiling is a configuration error, caught at load time
    unsafe {
        std::env::set_var("LAUNCHQ_MAX_CONCURRENT", "0");
    }
    assert!(Config::from_env().is_err());

    // So is garbage
    unsafe {
        std::env::set_var("LAUNCHQ_MAX_CONCURRENT", "not-a-number");
    }
    assert!(Config::from_env().is_err());

    // Clean up
    unsafe {
        std::env::remove_var("LAUNCHQ_REGISTRY");
        std::env::remove_var("LAUNCHQ_MAX_CONCURRENT");
        std::env::remove_var("LAUNCHQ_POLL_SECS");
    }
}
