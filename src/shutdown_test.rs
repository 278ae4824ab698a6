use super::*;
use serial_test::serial;

#[test]
#[serial]
fn test_shutdown_flag_transitions() {
    reset_for_test();
    assert!(!is_shutting_down());

    signal_shutdown();
    assert!(is_shutting_down());

    // Signaling again is a no-op
    signal_shutdown();
    assert!(is_shutting_down());
    reset_for_test();
}

#[tokio::test]
#[serial]
async fn test_cancelled_token_stops_listener_without_flag() {
    reset_for_test();
    let cancel = CancellationToken::new();
    cancel.cancel();

    cancel_on_ctrl_c(cancel.clone()).await;
    assert!(!is_shutting_down());
}
