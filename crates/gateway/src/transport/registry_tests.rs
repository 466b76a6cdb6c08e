use super::*;

#[tokio::test]
async fn resolve_delivers_result_to_caller() {
    let registry = PendingRequests::new();
    let rx = registry.set("1".to_owned());
    registry.resolve("1", serde_json::json!({"ok": true}));
    let result = rx.await.unwrap();
    assert_eq!(result.unwrap(), serde_json::json!({"ok": true}));
}

#[tokio::test]
async fn resolve_on_unknown_id_is_a_no_op() {
    let registry = PendingRequests::new();
    registry.resolve("missing", serde_json::json!(null));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn reject_rpc_surfaces_the_error_code() {
    let registry = PendingRequests::new();
    let rx = registry.set("1".to_owned());
    registry.reject_rpc(
        "1",
        RpcErrorPayload { code: -32601, message: "method not found".to_owned(), data: None },
    );
    let err = rx.await.unwrap().unwrap_err();
    assert!(err.is_method_not_found());
}

#[tokio::test]
async fn reject_all_drains_and_fails_every_pending_call() {
    let registry = PendingRequests::new();
    let rx1 = registry.set("1".to_owned());
    let rx2 = registry.set("2".to_owned());
    registry.reject_all(GatewayError::ConnectionClosed);
    assert!(registry.is_empty());
    assert!(matches!(rx1.await.unwrap(), Err(GatewayError::ConnectionClosed)));
    assert!(matches!(rx2.await.unwrap(), Err(GatewayError::ConnectionClosed)));
}

#[tokio::test]
async fn second_resolve_after_reject_is_a_no_op() {
    let registry = PendingRequests::new();
    let rx = registry.set("1".to_owned());
    registry.reject("1", GatewayError::ConnectionClosed);
    registry.resolve("1", serde_json::json!(1));
    assert!(matches!(rx.await.unwrap(), Err(GatewayError::ConnectionClosed)));
}

#[test]
fn counter_id_generator_produces_unique_increasing_ids() {
    let gen = CounterIdGenerator::default();
    let a = gen.next_id();
    let b = gen.next_id();
    assert_ne!(a, b);
    assert_eq!(a, "1");
    assert_eq!(b, "2");
}
