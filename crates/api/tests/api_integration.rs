//! Integration tests for the API server over the in-memory backend.

use std::sync::OnceLock;

use api::InMemoryBackend;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{ActorId, CustomerId, Money, ProductId};
use domain::Product;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    backend: InMemoryBackend,
}

fn setup() -> TestApp {
    let backend = InMemoryBackend::new();
    backend.identity.insert(ActorId::new(1), "alice");
    backend
        .customers
        .insert(domain::Customer {
            id: CustomerId::new(1),
            name: "Acme".into(),
            phone: None,
            address: Some("1 Main St".into()),
        });
    for (id, name, price) in [(1, "Widget", 100), (2, "Gadget", 200)] {
        backend.catalog.insert(Product {
            id: ProductId::new(id),
            name: name.into(),
            original_price: Money::from_minor(price),
        });
    }

    let app = api::create_app(backend.state(&Config::default()), get_metrics_handle());
    TestApp { app, backend }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(Some("1"), method, uri, body).await
    }

    async fn send_as(
        &self,
        actor: Option<&str>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header("x-actor-id", actor);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn stock(&self, product: i64, quantity: i64) -> String {
        let (status, row) = self.send("POST", &format!("/inventory/{product}"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, row) = self
            .send(
                "PATCH",
                &format!("/inventory/{product}/quantity"),
                Some(json!({
                    "delta": quantity,
                    "expected_version": row["version"],
                    "note": "initial stock"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        row["version"].as_str().unwrap().to_string()
    }

    async fn quantity(&self, product: i64) -> i64 {
        let (_, view) = self.send("GET", &format!("/inventory/{product}"), None).await;
        view["quantity"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let t = setup();
    let (status, json) = t.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["backend"], "memory");
    assert_eq!(json["sourcing_mode"], "declared");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup();
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_get_and_delete_order() {
    let t = setup();
    let version = t.stock(1, 10).await;

    let (status, created) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "additional_cost": 50,
                "image_keys": ["orders/1.png"],
                "lines": [
                    {
                        "product_id": 1,
                        "quantity": 4,
                        "selling_price": 150,
                        "expected_version": version,
                        "export_from": "INVENTORY"
                    },
                    {
                        "product_id": 2,
                        "quantity": 1,
                        "selling_price": 250,
                        "export_from": "EXTERNAL"
                    }
                ]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["customer"]["name"], "Acme");
    assert_eq!(created["total_original_cost"], 600);
    assert_eq!(created["total_sales_revenue"], 850);
    assert_eq!(created["profit_loss"], 200);
    assert_eq!(created["product_count"], 2);
    assert_eq!(created["items"].as_array().unwrap().len(), 2);
    assert!(
        created["image_urls"][0]
            .as_str()
            .unwrap()
            .contains("orders/1.png")
    );
    assert_eq!(t.quantity(1).await, 6);

    let id = created["id"].as_i64().unwrap();
    let (status, fetched) = t.send("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);

    let (status, _) = t.send("DELETE", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(t.quantity(1).await, 10);

    let (status, body) = t.send("GET", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["field"], "order_id");
}

#[tokio::test]
async fn test_stale_version_is_conflict() {
    let t = setup();
    let stale = t.stock(1, 10).await;
    t.stock(2, 1).await;
    // Move product 1 on, leaving `stale` behind.
    let (_, view) = t.send("GET", "/inventory/1", None).await;
    t.send(
        "PATCH",
        "/inventory/1/quantity",
        Some(json!({ "delta": 1, "expected_version": view["version"] })),
    )
    .await;

    let (status, body) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 1,
                    "quantity": 1,
                    "selling_price": 150,
                    "expected_version": stale,
                    "export_from": "INVENTORY"
                }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "VERSION_MISMATCH");
    assert_eq!(body["field"], "expected_version");
    assert!(body["message"].as_str().unwrap().contains("refetch"));
    assert_eq!(t.quantity(1).await, 11);
}

#[tokio::test]
async fn test_insufficient_stock() {
    let t = setup();
    let version = t.stock(1, 3).await;

    let (status, body) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 1,
                    "quantity": 5,
                    "selling_price": 150,
                    "expected_version": version,
                    "export_from": "INVENTORY"
                }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "QUANTITY_EXCEEDED");
    assert_eq!(t.quantity(1).await, 3);
    assert_eq!(t.backend.store.order_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_lines_rejected() {
    let t = setup();
    let line = json!({
        "product_id": 2,
        "quantity": 1,
        "selling_price": 250,
        "export_from": "EXTERNAL"
    });

    let (status, body) = t
        .send(
            "POST",
            "/orders",
            Some(json!({ "customer_id": 1, "lines": [line.clone(), line] })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DUPLICATE_ORDER_ITEMS");
}

#[tokio::test]
async fn test_unknown_export_source_is_bad_request() {
    let t = setup();
    let (status, body) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 2,
                    "quantity": 1,
                    "selling_price": 250,
                    "export_from": "WAREHOUSE"
                }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_missing_actor_is_unauthorized() {
    let t = setup();
    let (status, body) = t
        .send_as(
            None,
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 2,
                    "quantity": 1,
                    "selling_price": 250,
                    "export_from": "EXTERNAL"
                }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert!(body.get("field").is_none());
}

#[tokio::test]
async fn test_malformed_actor_header() {
    let t = setup();
    let (status, body) = t
        .send_as(Some("alice"), "DELETE", "/orders/1", None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "x-actor-id");
}

#[tokio::test]
async fn test_update_order_status() {
    let t = setup();
    let (_, created) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 2,
                    "quantity": 2,
                    "selling_price": 250,
                    "export_from": "EXTERNAL"
                }]
            })),
        )
        .await;
    let id = created["id"].as_i64().unwrap();
    assert!(created["status_changed_at"].is_null());

    let (status, updated) = t
        .send(
            "PATCH",
            &format!("/orders/{id}"),
            Some(json!({ "delivery_status": "DELIVERED", "note": "left at door" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["delivery_status"], "DELIVERED");
    assert_eq!(updated["note"], "left at door");
    assert!(!updated["status_changed_at"].is_null());
    assert_eq!(updated["total_sales_revenue"], 500);
}

#[tokio::test]
async fn test_list_orders_with_filters() {
    let t = setup();
    for customer in [1, 2, 1] {
        let (status, _) = t
            .send(
                "POST",
                "/orders",
                Some(json!({
                    "customer_id": customer,
                    "lines": [{
                        "product_id": 2,
                        "quantity": 1,
                        "selling_price": 250,
                        "export_from": "EXTERNAL"
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, all) = t.send("GET", "/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2, 1]);

    let (_, acme) = t.send("GET", "/orders?customer_id=1", None).await;
    assert_eq!(acme.as_array().unwrap().len(), 2);

    let (_, paged) = t
        .send("GET", "/orders?sort=order_date_asc&limit=1", None)
        .await;
    assert_eq!(paged.as_array().unwrap().len(), 1);

    let (status, body) = t.send("GET", "/orders?status=SHIPPED", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "status");
}

#[tokio::test]
async fn test_inventory_history_and_write_off() {
    let t = setup();
    let version = t.stock(1, 2).await;

    let (status, body) = t
        .send(
            "PATCH",
            "/inventory/1/quantity",
            Some(json!({ "delta": -3, "expected_version": version })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "QUANTITY_NEGATIVE");

    let (status, history) = t.send("GET", "/inventory/1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["importer_name"], "alice");
    assert_eq!(history[0]["note"], "initial stock");

    let (status, body) = t.send("GET", "/inventory/99/history", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["field"], "product_id");
}

#[tokio::test]
async fn test_zero_delta_is_bad_request() {
    let t = setup();
    let version = t.stock(1, 2).await;

    let (status, body) = t
        .send(
            "PATCH",
            "/inventory/1/quantity",
            Some(json!({ "delta": 0, "expected_version": version })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "delta");
}

#[tokio::test]
async fn test_list_inventory() {
    let t = setup();
    t.stock(2, 3).await;
    let version = t.stock(1, 10).await;

    let (status, list) = t.send("GET", "/inventory", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["product_id"], 1);
    assert_eq!(list[0]["quantity"], 10);
    assert_eq!(list[0]["version"], version.as_str());
    assert_eq!(list[0]["product"]["name"], "Widget");
    assert_eq!(list[0]["product"]["original_price"], 100);
    assert_eq!(list[1]["product"]["name"], "Gadget");
}

#[tokio::test]
async fn test_out_of_range_amounts_are_bad_requests() {
    let t = setup();
    let version = t.stock(1, 5).await;

    let (status, body) = t
        .send(
            "PATCH",
            "/inventory/1/quantity",
            Some(json!({ "delta": i64::MAX, "expected_version": version })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], "delta");
    assert_eq!(t.quantity(1).await, 5);

    let (status, body) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 1,
                    "quantity": 1_000_000_000_000_i64,
                    "selling_price": 100_000_000,
                    "export_from": "EXTERNAL"
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], "lines[0]");

    let (status, orders) = t
        .send("GET", "/orders?limit=18446744073709551615", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_order_line_packaging() {
    let t = setup();

    let (status, created) = t
        .send(
            "POST",
            "/orders",
            Some(json!({
                "customer_id": 1,
                "lines": [{
                    "product_id": 2,
                    "number_of_boxes": 2,
                    "spec": 6,
                    "quantity": 12,
                    "selling_price": 250,
                    "export_from": "EXTERNAL"
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");

    let line = &created["items"][0];
    assert_eq!(line["number_of_boxes"], 2);
    assert_eq!(line["spec"], 6);
    assert_eq!(line["profit_loss"], 600);
    assert!((line["profit_loss_percentage"].as_f64().unwrap() - 25.0).abs() < 1e-9);
}
