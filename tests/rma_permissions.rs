use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn users_cannot_change_status() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let id = app.create_rma(&customer).await?;

    for action in ["approve", "mark-evaluating", "mark-complete"] {
        let (status, body) = app.patch(&format!("/rma/{id}/{action}"), &customer).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{action}: {body}");
        assert_eq!(body["error"], "forbidden");
    }

    let (status, _) = app
        .json(
            "PATCH",
            &format!("/rma/{id}/reject"),
            Some(&customer),
            json!({ "rejection_reason": "changed my mind" }),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // still untouched
    let (_, body) = app.get(&format!("/rma/{id}"), &customer).await?;
    assert_eq!(body["status"], "RMA_SUBMITTED");

    Ok(())
}

#[tokio::test]
async fn out_of_order_moves_are_conflicts() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let (admin, _) = app.register_as("Admin", "admin@example.com", "ADMIN").await?;
    let id = app.create_rma(&customer).await?;

    let (status, body) = app.patch(&format!("/rma/{id}/mark-complete"), &admin).await?;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"], "invalid_state");

    let (status, _) = app.patch(&format!("/rma/{id}/approve"), &admin).await?;
    assert_eq!(status, StatusCode::OK);

    // approving twice
    let (status, _) = app.patch(&format!("/rma/{id}/approve"), &admin).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // reject only from RMA_SUBMITTED
    let (status, body) = app
        .json(
            "PATCH",
            &format!("/rma/{id}/reject"),
            Some(&admin),
            json!({ "rejection_reason": "too late" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    Ok(())
}

#[tokio::test]
async fn payment_requires_a_pdf_quote() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let (admin, _) = app.register_as("Admin", "admin@example.com", "ADMIN").await?;
    let id = app.create_rma(&customer).await?;

    app.patch(&format!("/rma/{id}/approve"), &admin).await?;
    app.patch(&format!("/rma/{id}/mark-evaluating"), &admin).await?;

    let (status, body) = app.patch(&format!("/rma/{id}/mark-payment"), &admin).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["error"], "missing_evidence");

    let (status, body) = app
        .patch_file(&format!("/rma/{id}/mark-payment"), &admin, "quote.docx", b"not a pdf")
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "validation_error");

    let (_, body) = app.get(&format!("/rma/{id}"), &admin).await?;
    assert_eq!(body["status"], "EVALUATING");
    assert!(body.get("quote").is_none());

    // a refused upload leaves nothing on disk
    let (status, _) = app
        .patch_file(&format!("/rma/{id}/mark-payment"), &customer, "quote.pdf", b"%PDF")
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!app.dir.path().join("uploads").join(&id).exists());

    let (status, body) = app
        .patch_file(&format!("/rma/{id}/mark-payment"), &admin, "quote.pdf", b"%PDF")
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "PAYMENT");

    Ok(())
}

#[tokio::test]
async fn blank_rejection_reason_is_a_validation_error() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let (admin, _) = app.register_as("Admin", "admin@example.com", "ADMIN").await?;
    let id = app.create_rma(&customer).await?;

    let (status, body) = app
        .json(
            "PATCH",
            &format!("/rma/{id}/reject"),
            Some(&admin),
            json!({ "rejection_reason": "   " }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "validation_error");

    Ok(())
}

#[tokio::test]
async fn unknown_rma_is_not_found() -> Result<()> {
    let app = common::spawn_app().await?;
    let (admin, _) = app.register_as("Admin", "admin@example.com", "ADMIN").await?;

    let missing = uuid::Uuid::new_v4();
    let (status, _) = app.patch(&format!("/rma/{missing}/approve"), &admin).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/rma/{missing}"), &admin).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn invalid_create_payload_is_rejected() -> Result<()> {
    let app = common::spawn_app().await?;
    let (customer, _) = app.register("Customer", "customer@example.com").await?;

    let mut payload = common::sample_rma();
    payload["postal_code"] = json!("6000");
    let (status, _) = app.json("POST", "/rma", Some(&customer), payload).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut payload = common::sample_rma();
    payload["items"] = json!([]);
    let (status, _) = app.json("POST", "/rma", Some(&customer), payload).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn only_superadmin_manages_roles() -> Result<()> {
    let app = common::spawn_app().await?;

    let (_, target_id) = app.register("Target", "target@example.com").await?;
    let (admin, _) = app.register_as("Admin", "admin@example.com", "ADMIN").await?;
    let (root, _) = app.register_as("Root", "root@example.com", "SUPERADMIN").await?;

    let uri = format!("/users/{target_id}/role");

    let (status, _) = app.json("PATCH", &uri, Some(&admin), json!({ "role": "ADMIN" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.json("PATCH", &uri, Some(&root), json!({ "role": "OWNER" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.json("PATCH", &uri, Some(&root), json!({ "role": "ADMIN" })).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "ADMIN");

    let missing = uuid::Uuid::new_v4();
    let (status, _) = app
        .json("PATCH", &format!("/users/{missing}/role"), Some(&root), json!({ "role": "USER" }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn tracking_is_only_accepted_when_shipping() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let (root, _) = app.register_as("Root", "root@example.com", "SUPERADMIN").await?;
    let id = app.create_rma(&customer).await?;

    // IN_SHIPPING is not the next step from RMA_SUBMITTED
    let (status, _) = app
        .json(
            "PATCH",
            &format!("/rma/{id}/mark-inshipping"),
            Some(&root),
            json!({ "tracking_information": "TRK1" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}
