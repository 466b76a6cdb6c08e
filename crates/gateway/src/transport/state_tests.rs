use super::*;

#[test]
fn subscribe_sees_current_snapshot_immediately() {
    let broadcaster = StateBroadcaster::new();
    broadcaster.set(TransportState::Connecting);
    let rx = broadcaster.subscribe();
    assert_eq!(*rx.borrow(), TransportState::Connecting);
}

#[test]
fn pill_folds_pre_connect_states_into_connecting() {
    assert_eq!(TransportState::Disconnected.pill(), "connecting");
    assert_eq!(TransportState::Connecting.pill(), "connecting");
    assert_eq!(TransportState::Handshaking.pill(), "connecting");
    assert_eq!(
        TransportState::Error { detail: "boom".to_owned() }.pill(),
        "error"
    );
    assert_eq!(
        TransportState::Rejected { code: "AUTH".to_owned(), reason: "bad token".to_owned() }
            .pill(),
        "rejected"
    );
}

#[test]
fn rejected_is_the_only_terminal_state() {
    assert!(!TransportState::Error { detail: "x".to_owned() }.is_terminal());
    assert!(TransportState::Rejected { code: "x".to_owned(), reason: "y".to_owned() }
        .is_terminal());
}

#[tokio::test]
async fn subscribers_observe_every_transition_in_order() {
    let broadcaster = StateBroadcaster::new();
    let mut rx = broadcaster.subscribe();
    broadcaster.set(TransportState::Connecting);
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), TransportState::Connecting);

    broadcaster.set(TransportState::Handshaking);
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), TransportState::Handshaking);
}
