use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use masjid_receipts::middleware::JwtConfig;
use masjid_receipts::models::{NewReceipt, PaymentMode, Role, UserWithRoles};
use masjid_receipts::store::MemoryLedgerStore;
use masjid_receipts::{create_router, AppState};

// Slow hashes make the suite crawl; cost 4 is plenty for tests.
const TEST_BCRYPT_COST: u32 = 4;

fn test_app() -> (Arc<MemoryLedgerStore>, Router, JwtConfig) {
    let store = Arc::new(MemoryLedgerStore::new());
    let jwt = JwtConfig::new("integration-test-secret", 60);
    let app = create_router(AppState::new(store.clone(), jwt.clone()));
    (store, app, jwt)
}

fn token_for(user: &UserWithRoles, jwt: &JwtConfig) -> String {
    masjid_receipts::middleware::create_token(user, jwt).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn receipt(amount: &str, category: &str, note: &str, uploaded_by: Uuid) -> NewReceipt {
    NewReceipt {
        amount: amount.parse().unwrap(),
        category: category.to_string(),
        payment_mode: PaymentMode::Cash,
        note: note.to_string(),
        image_url: "uploads/receipt.jpg".to_string(),
        uploaded_by,
    }
}

#[tokio::test]
async fn root_route_is_public() {
    let (_, app, _) = test_app();
    let response = app.oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Masjid Receipt System API is running");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (_, app, _) = test_app();
    let response = app.oneshot(get("/receipts", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Null token");
}

#[tokio::test]
async fn malformed_token_is_forbidden() {
    let (_, app, _) = test_app();
    let response = app
        .oneshot(get("/receipts", Some("not.a.jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Token is not valid");
}

#[tokio::test]
async fn token_signed_with_wrong_secret_is_forbidden() {
    let (store, app, _) = test_app();
    let user = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let other = JwtConfig::new("a-different-secret", 60);
    let token = token_for(&user, &other);
    let response = app.oneshot(get("/receipts", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Token is not valid");
}

#[tokio::test]
async fn role_miss_is_denied_with_message() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let token = token_for(&imam, &jwt);
    let response = app
        .oneshot(get("/reports/dashboard", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Access denied: Insufficient permissions");
}

#[tokio::test]
async fn upload_then_fetch_receipt() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);

    let created = app
        .clone()
        .oneshot(post_json(
            "/receipts",
            Some(&token_for(&imam, &jwt)),
            &json!({
                "amount": "250.50",
                "category": "Utilities",
                "payment_mode": "upi",
                "note": "electricity bill",
                "image_url": "uploads/bill.jpg",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["amount"].to_string(), "250.50");
    assert_eq!(created["payment_mode"], "UPI");
    let id = created["id"].as_str().unwrap().to_string();

    let fetched = app
        .clone()
        .oneshot(get(
            &format!("/receipts/{id}"),
            Some(&token_for(&finance, &jwt)),
        ))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let fetched = body_json(fetched).await;
    assert_eq!(fetched["note"], "electricity bill");
    assert_eq!(fetched["uploader"]["email"], "imam@masjid.org");

    let listed = app
        .oneshot(get("/receipts", Some(&token_for(&finance, &jwt))))
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(body_json(listed).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn uploaders_cannot_view_and_viewers_cannot_upload() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);

    let denied_view = app
        .clone()
        .oneshot(get("/receipts", Some(&token_for(&imam, &jwt))))
        .await
        .unwrap();
    assert_eq!(denied_view.status(), StatusCode::FORBIDDEN);

    let denied_upload = app
        .oneshot(post_json(
            "/receipts",
            Some(&token_for(&finance, &jwt)),
            &json!({ "amount": 10, "image_url": "uploads/x.jpg" }),
        ))
        .await
        .unwrap();
    assert_eq!(denied_upload.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn multi_role_user_passes_both_gates() {
    let (store, app, jwt) = test_app();
    let both = store.seed_user(
        "Hybrid",
        "hybrid@masjid.org",
        "x",
        &[Role::Imam, Role::Finance],
    );
    let token = token_for(&both, &jwt);

    let upload = app
        .clone()
        .oneshot(post_json(
            "/receipts",
            Some(&token),
            &json!({ "amount": 5, "image_url": "uploads/x.jpg" }),
        ))
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::CREATED);

    let view = app.oneshot(get("/receipts", Some(&token))).await.unwrap();
    assert_eq!(view.status(), StatusCode::OK);
}

#[tokio::test]
async fn receipt_image_is_required() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let response = app
        .oneshot(post_json(
            "/receipts",
            Some(&token_for(&imam, &jwt)),
            &json!({ "amount": 10 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Receipt image is required");
}

#[tokio::test]
async fn monthly_report_sums_only_the_window() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let auditor = store.seed_user("Auditor", "auditor@masjid.org", "x", &[Role::Auditor]);

    // First instant of May is in; first instant of June is out.
    store.seed_receipt(
        receipt("100.00", "General", "in window", imam.id),
        Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
    );
    store.seed_receipt(
        receipt("50.00", "General", "late in month", imam.id),
        Utc.with_ymd_and_hms(2023, 5, 31, 23, 59, 59).unwrap(),
    );
    store.seed_receipt(
        receipt("999.00", "General", "next month", imam.id),
        Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
    );

    let response = app
        .oneshot(get("/reports/month/2023-05", Some(&token_for(&auditor, &jwt))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["month"], "2023-05");
    assert_eq!(body["totalAmount"].to_string(), "150.00");
    assert_eq!(body["count"], 2);
    assert_eq!(body["receipts"].as_array().unwrap().len(), 2);
    // Interactive reports are newest first.
    assert_eq!(body["receipts"][0]["note"], "late in month");
}

#[tokio::test]
async fn malformed_periods_are_rejected() {
    let (store, app, jwt) = test_app();
    let auditor = store.seed_user("Auditor", "auditor@masjid.org", "x", &[Role::Auditor]);
    let token = token_for(&auditor, &jwt);

    for uri in [
        "/reports/month/2023-13",
        "/reports/month/2023-5",
        "/reports/month/202305",
        "/reports/year/23",
        "/reports/export/month/2023-00",
    ] {
        let response = app.clone().oneshot(get(uri, Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn tagging_is_idempotent_and_feeds_event_report() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);
    let token = token_for(&finance, &jwt);

    let seeded = store.seed_receipt(
        receipt("75.00", "Food", "iftar supplies", imam.id),
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
    );
    let tag_body = json!({ "tagName": "Ramadan", "month": "2024-03" });
    let uri = format!("/receipts/{}/tag", seeded.id);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json(&uri, Some(&token), &tag_body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Receipt tagged successfully");
        assert_eq!(body["tag"]["name"], "Ramadan");
    }
    assert_eq!(store.tag_count(), 1);
    assert_eq!(store.link_count(), 1);

    let report = app
        .oneshot(get("/reports/event/Ramadan", Some(&token)))
        .await
        .unwrap();
    assert_eq!(report.status(), StatusCode::OK);
    let report = body_json(report).await;
    assert_eq!(report["event"], "Ramadan");
    assert_eq!(report["count"], 1);
    assert_eq!(report["totalAmount"].to_string(), "75.00");
}

#[tokio::test]
async fn tagging_a_missing_receipt_is_not_found() {
    let (store, app, jwt) = test_app();
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);
    let response = app
        .oneshot(post_json(
            &format!("/receipts/{}/tag", Uuid::new_v4()),
            Some(&token_for(&finance, &jwt)),
            &json!({ "tagName": "Ramadan" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Receipt not found");
    assert_eq!(store.tag_count(), 0);
}

#[tokio::test]
async fn tag_month_must_be_well_formed() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);
    let seeded = store.seed_receipt(
        receipt("10.00", "General", "", imam.id),
        Utc::now(),
    );
    let response = app
        .oneshot(post_json(
            &format!("/receipts/{}/tag", seeded.id),
            Some(&token_for(&finance, &jwt)),
            &json!({ "tagName": "Eid", "month": "March 2024" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dashboard_aggregates_by_category() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let auditor = store.seed_user("Auditor", "auditor@masjid.org", "x", &[Role::Auditor]);

    store.seed_receipt(
        receipt("0.10", "Food", "a", imam.id),
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
    );
    store.seed_receipt(
        receipt("0.20", "Food", "b", imam.id),
        Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap(),
    );
    store.seed_receipt(
        receipt("40.00", "Utilities", "c", imam.id),
        Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap(),
    );

    let response = app
        .oneshot(get("/reports/dashboard", Some(&token_for(&auditor, &jwt))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["totalAmount"].to_string(), "40.30");
    assert_eq!(body["totalReceipts"], 3);

    let categories = body["categoryCounts"].as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["category"], "Food");
    // Decimal sums stay exact; 0.10 + 0.20 is 0.30, not a float neighbor.
    assert_eq!(categories[0]["_sum"]["amount"].to_string(), "0.30");

    let recent = body["recentReceipts"].as_array().unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0]["note"], "c");
    assert_eq!(recent[0]["uploader"]["name"], "Imam");
}

#[tokio::test]
async fn exports_are_spreadsheets_with_attachment_headers() {
    let (store, app, jwt) = test_app();
    let imam = store.seed_user("Imam", "imam@masjid.org", "x", &[Role::Imam]);
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);
    store.seed_receipt(
        receipt("20.00", "General", "x", imam.id),
        Utc.with_ymd_and_hms(2024, 2, 10, 10, 0, 0).unwrap(),
    );

    let response = app
        .oneshot(get(
            "/reports/export/month/2024-02",
            Some(&token_for(&finance, &jwt)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=Report_2024-02.xlsx"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn login_issues_a_working_token() {
    let (store, app, _) = test_app();
    let hash = bcrypt::hash("secret123", TEST_BCRYPT_COST).unwrap();
    store.seed_user("Finance", "finance@masjid.org", &hash, &[Role::Finance]);

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({ "email": "finance@masjid.org", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["role"], "FINANCE");
    assert_eq!(body["roles"], json!(["FINANCE"]));
    let token = body["token"].as_str().unwrap().to_string();

    let listed = app.oneshot(get("/receipts", Some(&token))).await.unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let (store, app, _) = test_app();
    let hash = bcrypt::hash("secret123", TEST_BCRYPT_COST).unwrap();
    store.seed_user("Finance", "finance@masjid.org", &hash, &[Role::Finance]);

    let wrong_password = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({ "email": "finance@masjid.org", "password": "nope" }),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);

    let unknown_user = app
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({ "email": "ghost@masjid.org", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let (store, app, jwt) = test_app();
    let hash = bcrypt::hash("old-pass", TEST_BCRYPT_COST).unwrap();
    let user = store.seed_user("Imam", "imam@masjid.org", &hash, &[Role::Imam]);
    let token = token_for(&user, &jwt);

    let wrong_current = app
        .clone()
        .oneshot(post_json(
            "/auth/change-password",
            Some(&token),
            &json!({ "currentPassword": "guess", "newPassword": "brand-new" }),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_current.status(), StatusCode::UNAUTHORIZED);

    let too_short = app
        .clone()
        .oneshot(post_json(
            "/auth/change-password",
            Some(&token),
            &json!({ "currentPassword": "old-pass", "newPassword": "abc" }),
        ))
        .await
        .unwrap();
    assert_eq!(too_short.status(), StatusCode::BAD_REQUEST);

    let changed = app
        .clone()
        .oneshot(post_json(
            "/auth/change-password",
            Some(&token),
            &json!({ "currentPassword": "old-pass", "newPassword": "brand-new" }),
        ))
        .await
        .unwrap();
    assert_eq!(changed.status(), StatusCode::OK);

    // Old login fails, new one works.
    let stale = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({ "email": "imam@masjid.org", "password": "old-pass" }),
        ))
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

    let fresh = app
        .oneshot(post_json(
            "/auth/login",
            None,
            &json!({ "email": "imam@masjid.org", "password": "brand-new" }),
        ))
        .await
        .unwrap();
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn user_administration_is_admin_only() {
    let (store, app, jwt) = test_app();
    let admin = store.seed_user("Admin", "admin@masjid.org", "x", &[Role::Admin]);
    let finance = store.seed_user("Finance", "finance@masjid.org", "x", &[Role::Finance]);

    let denied = app
        .clone()
        .oneshot(get("/users", Some(&token_for(&finance, &jwt))))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let token = token_for(&admin, &jwt);
    let created = app
        .clone()
        .oneshot(post_json(
            "/users",
            Some(&token),
            &json!({
                "name": "New Imam",
                "email": "new@masjid.org",
                "password": "welcome1",
                "roles": ["IMAM"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["roles"], json!(["IMAM"]));
    assert!(created.get("password_hash").is_none());
    let new_id = created["id"].as_str().unwrap().to_string();

    let duplicate = app
        .clone()
        .oneshot(post_json(
            "/users",
            Some(&token),
            &json!({
                "name": "Dup",
                "email": "new@masjid.org",
                "password": "welcome1",
                "roles": ["IMAM"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);
    let duplicate = body_json(duplicate).await;
    assert_eq!(duplicate["error"], "Email already exists");

    let deleted = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/users/{new_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let gone = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/users/{new_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_roles_match_what_a_re_read_reports() {
    let (store, app, jwt) = test_app();
    let admin = store.seed_user("Admin", "admin@masjid.org", "x", &[Role::Admin]);
    let token = token_for(&admin, &jwt);

    let created = app
        .clone()
        .oneshot(post_json(
            "/users",
            Some(&token),
            &json!({
                "name": "New Finance",
                "email": "nf@masjid.org",
                "password": "welcome1",
                "roles": ["FINANCE", "AUDITOR"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["roles"], json!(["FINANCE", "AUDITOR"]));

    // The creation body must never claim a role the store did not keep.
    let listed = app.oneshot(get("/users", Some(&token))).await.unwrap();
    let listed = body_json(listed).await;
    let persisted = listed
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == "nf@masjid.org")
        .unwrap();
    assert_eq!(persisted["roles"], created["roles"]);
}

#[tokio::test]
async fn unknown_role_names_fail_user_creation() {
    let (store, app, jwt) = test_app();
    let admin = store.seed_user("Admin", "admin@masjid.org", "x", &[Role::Admin]);
    let response = app
        .oneshot(post_json(
            "/users",
            Some(&token_for(&admin, &jwt)),
            &json!({
                "name": "X",
                "email": "x@masjid.org",
                "password": "welcome1",
                "roles": ["SUPERUSER"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn buyer_is_accepted_as_an_imam_alias() {
    let (store, app, jwt) = test_app();
    let admin = store.seed_user("Admin", "admin@masjid.org", "x", &[Role::Admin]);
    let response = app
        .oneshot(post_json(
            "/users",
            Some(&token_for(&admin, &jwt)),
            &json!({
                "name": "Legacy",
                "email": "legacy@masjid.org",
                "password": "welcome1",
                "roles": ["BUYER"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["roles"], json!(["IMAM"]));
}
