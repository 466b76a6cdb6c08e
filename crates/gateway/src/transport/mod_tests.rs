use super::*;
use crate::config::GatewayConfig;

fn test_config() -> GatewayConfig {
    GatewayConfig::new("ws://127.0.0.1:1/gateway", "test-client").unwrap()
}

#[tokio::test]
async fn call_before_start_fails_not_connected() {
    let transport = Transport::new(test_config());
    let err = transport.call("chat.list", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
}

#[test]
fn send_binary_before_start_fails_not_connected() {
    let transport = Transport::new(test_config());
    let err = transport.send_binary(Bytes::from_static(b"x")).unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
}

#[test]
fn initial_state_is_disconnected() {
    let transport = Transport::new(test_config());
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[test]
fn on_state_change_snapshots_the_current_state_synchronously() {
    let transport = Transport::new(test_config());
    let rx = transport.on_state_change();
    assert_eq!(*rx.borrow(), TransportState::Disconnected);
}

#[test]
fn set_connection_with_same_url_and_token_is_a_no_op() {
    let transport = Transport::new(test_config());
    let before = transport.state();
    transport.set_connection(test_config());
    assert_eq!(transport.state(), before);
}

#[test]
fn on_binary_message_flushes_the_backlog_in_fifo_order() {
    let transport = Transport::new(test_config());
    transport.shared.deliver_binary(Bytes::from_static(b"a"));
    transport.shared.deliver_binary(Bytes::from_static(b"b"));
    let (mut rx, _unsub) = transport.on_binary_message();
    assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"a"));
    assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"b"));
}

#[test]
fn binary_frames_after_subscription_deliver_directly() {
    let transport = Transport::new(test_config());
    let (mut rx, _unsub) = transport.on_binary_message();
    transport.shared.deliver_binary(Bytes::from_static(b"live"));
    assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"live"));
}
