use actix_web::{test, web, App};
use serde_json::json;
use std::sync::Arc;

use photofeed::api::{self, AppState};
use photofeed::auth::AuthService;
use photofeed::store::Store;

/// Helper to create AppState with all required components
fn create_app_state(store: Arc<Store>, auth_service: Arc<AuthService>) -> AppState {
    AppState {
        store,
        auth_service,
    }
}

fn create_services() -> (Arc<Store>, Arc<AuthService>) {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let auth_service = Arc::new(
        AuthService::new("test_secret".to_string(), store.clone()).with_bcrypt_cost(4),
    );
    (store, auth_service)
}

// ==================== Registration Tests ====================

#[actix_web::test]
async fn test_register_success() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "newuser",
            "email": "newuser@example.com",
            "password": "newpassword123"
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["message"], "User registered successfully");
    // Password should not be in response
    assert!(body["data"]["password"].is_null());

    // Stored hashed, never in plain form
    let user = store.get_user_by_username("newuser").unwrap();
    assert_ne!(user.password_hash, "newpassword123");
    assert!(!user.is_staff);
}

#[actix_web::test]
async fn test_register_short_password_fails() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "shorty",
            "email": "shorty@example.com",
            "password": "abc"
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["fields"]["password"].is_array(), "Should mention password: {}", body);
    assert_eq!(store.count_users().unwrap(), 0);
}

#[actix_web::test]
async fn test_register_missing_fields_fails() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "incompleteuser"
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["fields"]["password"].is_array());
    assert!(body["fields"]["email"].is_array());
    assert!(body["fields"]["username"].is_null());
}

#[actix_web::test]
async fn test_register_duplicate_username_and_email() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "user1",
            "email": "user1@example.com",
            "password": "password123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "user1",
            "email": "other@example.com",
            "password": "password123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["fields"]["username"].is_array());

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "user2",
            "email": "user1@example.com",
            "password": "password123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["fields"]["email"].is_array());

    assert_eq!(store.count_users().unwrap(), 1);
}

#[actix_web::test]
async fn test_register_reports_all_field_errors_together() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "user1",
            "email": "user1@example.com",
            "password": "password123"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // Same username and email, and a password that is too short
    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "user1",
            "email": "user1@example.com",
            "password": "abc"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(
        body["fields"]["username"][0],
        "A user with that username already exists."
    );
    assert_eq!(body["fields"]["email"][0], "A user with that email already exists.");
    assert!(body["fields"]["password"].is_array());
    assert_eq!(store.count_users().unwrap(), 1);
}

#[actix_web::test]
async fn test_register_malformed_json() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

// ==================== Login Tests ====================

#[actix_web::test]
async fn test_login_success() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    // First register
    let req = test::TestRequest::post()
        .uri("/api/auth/register/")
        .set_json(json!({
            "username": "testuser",
            "email": "test@example.com",
            "password": "mypassword123"
        }))
        .to_request();
    test::call_service(&app, req).await;

    // Now login
    let req = test::TestRequest::post()
        .uri("/api/auth/login/")
        .set_json(json!({
            "username": "testuser",
            "password": "mypassword123"
        }))
        .to_request();

    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let access = resp["data"]["access"].as_str().unwrap().to_string();
    assert!(resp["data"]["refresh"].is_string());

    // The access token opens protected routes
    let req = test::TestRequest::get()
        .uri("/api/v1/users/")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_login_wrong_password() {
    let (store, auth_service) = create_services();
    auth_service
        .ensure_staff_account("admin", "admin@example.com", "correct-horse")
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login/")
        .set_json(json!({
            "username": "admin",
            "password": "wrong-horse"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/auth/login/")
        .set_json(json!({
            "username": "ghost",
            "password": "correct-horse"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_token_refresh() {
    let (store, auth_service) = create_services();
    auth_service
        .ensure_staff_account("admin", "admin@example.com", "correct-horse")
        .unwrap();
    let pair = auth_service.login("admin", "correct-horse").unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/token/refresh/")
        .set_json(json!({ "refresh": pair.refresh }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let access = body["data"]["access"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/v1/users/admin/")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // An access token is not a refresh token
    let req = test::TestRequest::post()
        .uri("/api/auth/token/refresh/")
        .set_json(json!({ "refresh": pair.access }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

// ==================== Bearer Authentication Tests ====================

#[actix_web::test]
async fn test_protected_routes_require_token() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    for uri in ["/api/v1/users/", "/api/v1/posts/"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401, "{} should require auth", uri);
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/users/")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/users/")
        .insert_header(("Authorization", "Token abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_refresh_token_cannot_authenticate() {
    let (store, auth_service) = create_services();
    auth_service
        .ensure_staff_account("admin", "admin@example.com", "correct-horse")
        .unwrap();
    let pair = auth_service.login("admin", "correct-horse").unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/users/")
        .insert_header(("Authorization", format!("Bearer {}", pair.refresh)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_health() {
    let (store, auth_service) = create_services();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(create_app_state(store.clone(), auth_service.clone())))
            .configure(api::configure_routes)
    ).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["status"], "ok");
}
