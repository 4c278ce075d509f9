use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

mod common;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let app = common::spawn_app().await?;

    // 1. Register with short password
    let (status, _) = app
        .json(
            "POST",
            "/auth/register",
            None,
            json!({ "name": "Short Pass", "email": "short@example.com", "password": "short" }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "Should fail with bad request for short password");

    // 2. Register with valid user
    let (token, _) = app.register("Valid User", "valid@example.com").await?;

    // 3. Same email again
    let (status, body) = app
        .json(
            "POST",
            "/auth/register",
            None,
            json!({ "name": "Again", "email": "Valid@Example.com", "password": "password123" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // 4. Login with wrong password
    let (status, _) = app
        .json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "valid@example.com", "password": "wrongpassword" }),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "Should fail with unauthorized for wrong password");

    // 5. Login with non-existent email
    let (status, _) = app
        .json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "nobody@example.com", "password": "password123" }),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "Should fail with unauthorized for non-existent user");

    // 6. Protected route without token
    let req = Request::builder().method("GET").uri("/rma").body(Body::empty())?;
    let (status, _) = app.send(req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "Should fail with unauthorized for missing token");

    // 7. Garbage token
    let (status, body) = app.get("/rma", "not-a-jwt").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token");

    // 8. /auth/me lists the USER grants
    let (status, body) = app.get("/auth/me", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "USER");
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .expect("permissions array")
        .iter()
        .filter_map(|p| p.as_str())
        .collect();
    assert!(permissions.contains(&"rma:create"));
    assert!(!permissions.contains(&"rma:change_status"));

    // 9. Login works with the right password
    let (status, body) = app
        .json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "valid@example.com", "password": "password123" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());

    Ok(())
}

#[tokio::test]
async fn role_changes_apply_to_existing_tokens() -> Result<()> {
    let app = common::spawn_app().await?;

    let (token, user_id) = app.register("Later Admin", "later@example.com").await?;
    let (_, body) = app.get("/auth/me", &token).await?;
    assert_eq!(body["user"]["role"], "USER");

    sqlx::query("UPDATE users SET role = 'ADMIN' WHERE id = ?")
        .bind(&user_id)
        .execute(&app.pool)
        .await?;

    let (_, body) = app.get("/auth/me", &token).await?;
    assert_eq!(body["user"]["role"], "ADMIN");
    let permissions = body["permissions"].as_array().expect("permissions array");
    assert!(permissions.contains(&json!("rma:change_status")));

    Ok(())
}

#[tokio::test]
async fn unrecognized_stored_role_grants_nothing() -> Result<()> {
    let app = common::spawn_app().await?;

    let (token, _) = app.register_as("Mystery", "mystery@example.com", "OWNER").await?;

    let (status, body) = app.get("/auth/me", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"]["role"].is_null());
    assert_eq!(body["permissions"], json!([]));

    let (status, _) = app.json("POST", "/rma", Some(&token), common::sample_rma()).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
