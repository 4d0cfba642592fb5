mod common;

use checkout_service::models::OrderStatus;
use common::{create_de_order, TestApp, TEST_USER_ID};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn get_order_returns_the_order() {
    let app = TestApp::spawn().await;
    let order_id = create_de_order(&app, "pi_ord_1", 10_000, 1, 1_900).await;

    let response = app.get(&format!("/orders/{}", order_id)).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], order_id.to_string().as_str());
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount"], 10_000);
    assert_eq!(body["taxAmount"], 1_900);
    assert_eq!(body["total"], 11_900);
    assert_eq!(body["providerIntentId"], "pi_ord_1");
    assert_eq!(body["userId"], TEST_USER_ID);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get(&format!("/orders/{}", Uuid::new_v4())).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .post_json(
            &format!("/orders/{}/update-status", Uuid::new_v4()),
            &json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn admin_can_cancel_a_pending_order() {
    let app = TestApp::spawn().await;
    let order_id = create_de_order(&app, "pi_ord_2", 10_000, 1, 1_900).await;

    let response = app
        .post_json(
            &format!("/orders/{}/update-status", order_id),
            &json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");

    let order = app.state.ledger.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);

    // sendNotification defaults to true
    assert_eq!(app.notifier.count(), 1);
    assert_eq!(app.notifier.calls()[0].2, OrderStatus::Cancelled);
}

#[tokio::test]
async fn cancelling_a_completed_order_conflicts() {
    let app = TestApp::spawn().await;
    let order_id = create_de_order(&app, "pi_ord_3", 10_000, 1, 1_900).await;

    let response = app
        .post_json(
            &format!("/orders/{}/update-status", order_id),
            &json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .post_json(
            &format!("/orders/{}/update-status", order_id),
            &json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let order = app.state.ledger.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn repeating_a_status_is_a_noop() {
    let app = TestApp::spawn().await;
    let order_id = create_de_order(&app, "pi_ord_4", 10_000, 1, 1_900).await;

    for _ in 0..2 {
        let response = app
            .post_json(
                &format!("/orders/{}/update-status", order_id),
                &json!({ "status": "completed" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }

    // only the first transition notified
    assert_eq!(app.notifier.count(), 1);
}

#[tokio::test]
async fn notifications_can_be_suppressed() {
    let app = TestApp::spawn().await;
    let order_id = create_de_order(&app, "pi_ord_5", 10_000, 1, 1_900).await;

    let response = app
        .post_json(
            &format!("/orders/{}/update-status", order_id),
            &json!({
                "status": "cancelled",
                "sendNotification": false,
                "sendEmail": false
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.notifier.count(), 0);
}
