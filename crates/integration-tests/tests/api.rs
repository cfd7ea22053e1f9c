//! Integration tests for the HTTP API against a real database.
//!
//! Requests go straight into the router with a bearer token from
//! `AuthService::login`, so no listener, session store or rate limiter is
//! involved.
//!
//! These tests require a `PostgreSQL` database in `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p autohaul-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use autohaul_core::UserRole;
use autohaul_integration_tests::{Tenant, TestDb, member, onboard, seed};
use autohaul_server::config::ServerConfig;
use autohaul_server::routes;
use autohaul_server::services::tenant::AuthToken;
use autohaul_server::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn app(db: &TestDb) -> Router {
    let config = ServerConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused/autohaul".to_owned()),
        _ => None,
    })
    .unwrap();
    routes::routes().with_state(AppState::new(config, db.pool.clone()))
}

struct Client {
    app: Router,
}

impl Client {
    async fn send(
        &self,
        method: Method,
        path: &str,
        token: &AuthToken,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.expose()));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, path: &str, tenant: &Tenant) -> (StatusCode, Value) {
        self.send(Method::GET, path, &tenant.token, None).await
    }
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_shipment_crud_over_http() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let client = Client { app: app(&db) };
    let token = &acme.token;

    let (status, customer) = client
        .send(
            Method::POST,
            "/api/customers",
            token,
            Some(json!({ "name": "Jane Doe", "email": "jane@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{customer}");
    assert_eq!(customer["organization_id"], json!(acme.organization.id));

    let (status, shipment) = client
        .send(
            Method::POST,
            "/api/shipments",
            token,
            Some(json!({
                "customer_id": customer["id"],
                "origin": "Dallas, TX",
                "destination": "Denver, CO",
                "price": "1250.00",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{shipment}");
    assert_eq!(shipment["status"], "pending");
    let shipment_path = format!("/api/shipments/{}", shipment["id"].as_str().unwrap());

    let (status, vehicle) = client
        .send(
            Method::POST,
            &format!("{shipment_path}/vehicles"),
            token,
            Some(json!({ "make": "Honda", "model": "Civic", "year": 2019 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{vehicle}");
    assert_eq!(vehicle["shipment_id"], shipment["id"]);

    let (status, vehicles) = client
        .get(&format!("{shipment_path}/vehicles"), &acme)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vehicles["total"], 1);

    let (status, updated) = client
        .send(
            Method::PATCH,
            &shipment_path,
            token,
            Some(json!({ "status": "cancelled", "notes": "customer called" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["status"], "cancelled");

    // Cancelled is terminal
    let (status, body) = client
        .send(
            Method::PATCH,
            &shipment_path,
            token,
            Some(json!({ "status": "in_transit" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, page) = client
        .get("/api/shipments?status=cancelled&limit=10", &acme)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 10);

    let (status, _) = client
        .send(Method::DELETE, &shipment_path, token, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = client.get(&shipment_path, &acme).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(db.count_rows("vehicles").await, 0);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_foreign_records_look_like_missing_ones() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;
    let a = seed(&db, &acme.identity, "acme").await;
    let client = Client { app: app(&db) };

    let paths = [
        format!("/api/customers/{}", a.customer.id),
        format!("/api/carriers/{}", a.carrier.id),
        format!("/api/shipments/{}", a.shipment.id),
        format!("/api/shipments/{}/vehicles", a.shipment.id),
        format!("/api/vehicles/{}", a.vehicle.id),
        format!("/api/users/{}", acme.owner.id),
    ];
    let (missing_status, missing_body) = client
        .get(&format!("/api/customers/{}", Uuid::new_v4()), &globex)
        .await;
    assert_eq!(missing_status, StatusCode::NOT_FOUND);

    for path in &paths {
        let (status, body) = client.get(path, &globex).await;
        assert_eq!(status, missing_status, "{path}");
        assert_eq!(body, missing_body, "{path}");
    }

    for (method, path) in [
        (Method::PATCH, &paths[0]),
        (Method::DELETE, &paths[2]),
        (Method::DELETE, &paths[4]),
    ] {
        let body = (method == Method::PATCH).then(|| json!({ "name": "Hijacked" }));
        let (status, response) = client.send(method, path, &globex.token, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response, missing_body, "{path}");
    }

    // Linking to a foreign customer is also reported as not found
    let (status, body) = client
        .send(
            Method::POST,
            "/api/shipments",
            &globex.token,
            Some(json!({
                "customer_id": a.customer.id,
                "origin": "Austin, TX",
                "destination": "Reno, NV",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, missing_body);

    // A planted organization_id does not move the record
    let (status, customer) = client
        .send(
            Method::POST,
            "/api/customers",
            &globex.token,
            Some(json!({ "name": "Planted", "organization_id": acme.organization.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(customer["organization_id"], json!(globex.organization.id));

    let (_, page) = client.get("/api/customers", &acme).await;
    assert_eq!(page["total"], 1);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_roles_gate_writes() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let (_, viewer) = member(&db, &acme, UserRole::Viewer).await;
    let (_, dispatcher) = member(&db, &acme, UserRole::Dispatcher).await;
    let client = Client { app: app(&db) };
    let customer = json!({ "name": "Read Only" });

    let (status, _) = client
        .send(Method::GET, "/api/customers", &viewer.token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = client
        .send(
            Method::POST,
            "/api/customers",
            &viewer.token,
            Some(customer.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = client
        .send(Method::POST, "/api/customers", &dispatcher.token, Some(customer))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = client
        .send(
            Method::POST,
            "/api/users",
            &dispatcher.token,
            Some(json!({
                "email": "new@acme.test",
                "name": "New",
                "password": "long enough password",
                "role": "viewer",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, user) = client
        .send(
            Method::POST,
            "/api/users",
            &acme.token,
            Some(json!({
                "email": "new@acme.test",
                "name": "New",
                "password": "long enough password",
                "role": "viewer",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{user}");
    assert!(user.get("password_hash").is_none());

    let (status, me) = client
        .send(Method::GET, "/api/me", &dispatcher.token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "dispatcher");
    assert_eq!(me["organization_id"], json!(acme.organization.id));

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_revoked_and_inactive_tokens_are_rejected() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let (_, dispatcher) = member(&db, &acme, UserRole::Dispatcher).await;
    let client = Client { app: app(&db) };

    db.auth().logout(&dispatcher.token).await.unwrap();
    let (status, body) = client
        .send(Method::GET, "/api/me", &dispatcher.token, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Authentication required" }));

    sqlx::query("UPDATE organizations SET is_active = FALSE")
        .execute(&db.pool)
        .await
        .unwrap();
    let (status, body) = client.get("/api/me", &acme).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Account is inactive" }));

    db.cleanup().await;
}
