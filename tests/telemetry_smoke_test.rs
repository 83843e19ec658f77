#[test]
fn init_tracing_is_single_shot() {
    launchq::telemetry::init_tracing("info").unwrap();
    // A second install must fail rather than silently replace the subscriber.
    assert!(launchq::telemetry::init_tracing("info").is_err());
}
