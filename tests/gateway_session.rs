//! A client session over an in-memory duplex stream.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use jobbuilda::config::Config;
use jobbuilda::gateway::{ErrorCode, Gateway, Methods, Request, serve_connection};
use jobbuilda::store::Database;

fn next(request: Value) -> String {
    let mut line = request.to_string();
    line.push('\n');
    line
}

#[tokio::test]
async fn quote_approval_over_the_wire() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let gateway = Arc::new(Gateway::with_database(db, &Config::default()).unwrap());

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_rx, server_tx) = tokio::io::split(server);
    let session = tokio::spawn(serve_connection(gateway, server_rx, server_tx));

    let (client_rx, mut client_tx) = tokio::io::split(client);
    let mut lines = BufReader::new(client_rx).lines();

    let ctx = json!({"tenant_id": "sparks-ltd", "actor": "dispatcher"});

    let sub = next(json!({"id": 1, "method": "subscribe", "params": {"context": ctx}}));
    client_tx.write_all(sub.as_bytes()).await.unwrap();
    let ack: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(ack["result"]["subscribed"], true);

    let create = next(json!({
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "create_quote",
            "arguments": {"client_id": "c9", "title": "EV charger", "items": [{"description": "7kW charger", "quantity": 1, "unit_price_pence": 65000}]},
            "context": ctx
        }
    }));
    client_tx.write_all(create.as_bytes()).await.unwrap();

    // the response and the notification may arrive in either order
    let mut quote_id = None;
    let mut notified = false;
    for _ in 0..2 {
        let msg: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        if msg.get("id") == Some(&json!(2)) {
            quote_id = msg["result"]["id"].as_str().map(str::to_string);
        } else {
            assert_eq!(msg["event"], "quote.created");
            assert_eq!(msg["data"]["actor"], "dispatcher");
            notified = true;
        }
    }
    let quote_id = quote_id.expect("create_quote response");
    assert!(notified);

    let approve = next(json!({
        "id": 3,
        "method": "tools/call",
        "params": {"name": "approve_quote", "arguments": {"quote_id": quote_id}, "context": ctx}
    }));
    client_tx.write_all(approve.as_bytes()).await.unwrap();
    let conflict: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(conflict["id"], 3);
    assert_eq!(conflict["error"]["code"], ErrorCode::INVALID_STATE);

    drop(client_tx);
    drop(lines);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_amounts_are_rejected_without_harming_other_tenants() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let gateway = Gateway::with_database(db, &Config::default()).unwrap();
    let call = |id: u64, tenant: &str, name: &str, arguments: Value| {
        Request::new(
            id,
            Methods::TOOLS_CALL,
            json!({"name": name, "arguments": arguments, "context": {"tenant_id": tenant}}),
        )
    };

    let oversized = [
        call(1, "tenant-a", "record_expense", json!({"supplier": "CEF", "description": "Cable", "net_pence": i64::MAX, "vat_pence": 1, "incurred_on": "2024-05-01"})),
        call(2, "tenant-a", "create_quote", json!({"client_id": "c1", "title": "t", "items": [{"description": "x", "quantity": 2, "unit_price_pence": i64::MAX}]})),
        call(3, "tenant-a", "create_quote", json!({"client_id": "c1", "title": "t", "items": [{"description": "x", "quantity": 1e300, "unit_price_pence": 1}]})),
    ];
    for request in oversized {
        let response = gateway.handle(request).await;
        assert_eq!(response.error.unwrap().code, ErrorCode::INVALID_PARAMS);
    }

    let quote = gateway
        .handle(call(4, "tenant-b", "create_quote", json!({"client_id": "c9", "title": "Fuse board", "items": [{"description": "Board", "quantity": 1, "unit_price_pence": 30000}]})))
        .await;
    assert!(quote.is_success(), "{:?}", quote.error);

    let events = gateway
        .handle(Request::new(
            5,
            Methods::RESOURCES_READ,
            json!({"uri": "jobbuilda://events", "context": {"tenant_id": "tenant-a"}}),
        ))
        .await;
    assert!(events.result.unwrap().as_array().unwrap().is_empty());
}

