use claims::{assert_err, assert_ok};
use common::telemetry::{
    get_tracing_subscriber, init_tracing_subscriber, spawn_blocking_with_tracing,
};

// The global subscriber can only be set once per process,
// so both registrations live in the same test.
#[test]
fn tracing_subscriber_can_only_be_registered_once() {
    let subscriber = get_tracing_subscriber("test".into(), "info".into(), std::io::sink);
    assert_ok!(init_tracing_subscriber(subscriber));

    let subscriber = get_tracing_subscriber("test".into(), "info".into(), std::io::sink);
    assert_err!(init_tracing_subscriber(subscriber));
}

#[tokio::test]
async fn blocking_closures_return_their_result() {
    let sum = spawn_blocking_with_tracing(|| (1..=4).sum::<u32>()).await;

    assert_eq!(assert_ok!(sum), 10);
}
