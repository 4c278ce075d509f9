use anyhow::Result;
use axum::http::StatusCode;

mod common;

async fn walk_to_evaluating(app: &common::TestApp, root: &str, customer: &str) -> Result<String> {
    let id = app.create_rma(customer).await?;
    for step in ["approve", "mark-evaluating"] {
        let (status, body) = app.patch(&format!("/rma/{id}/{step}"), root).await?;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
    }
    Ok(id)
}

#[tokio::test]
async fn purchase_order_is_optional_but_must_be_a_pdf() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let (root, _) = app.register_as("Root", "root@example.com", "SUPERADMIN").await?;

    let id = walk_to_evaluating(&app, &root, &customer).await?;
    let (status, body) = app
        .patch_file(&format!("/rma/{id}/mark-payment"), &root, "quote.pdf", b"%PDF-1.4 quote")
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.stored_files(&id), 1);

    let (status, body) = app
        .patch_file(&format!("/rma/{id}/mark-processing"), &root, "po.txt", b"plain text")
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(app.stored_files(&id), 1);

    let (_, body) = app.get(&format!("/rma/{id}"), &root).await?;
    assert_eq!(body["status"], "PAYMENT");

    let (status, body) = app
        .patch_file(&format!("/rma/{id}/mark-processing"), &root, "po.pdf", b"%PDF-1.4 po")
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "PROCESSING");
    assert_eq!(body["purchase_order"]["filename"], "po.pdf");
    assert_eq!(body["quote"]["filename"], "quote.pdf");
    assert_eq!(app.stored_files(&id), 2);

    // without a purchase order
    let other = walk_to_evaluating(&app, &root, &customer).await?;
    app.patch_file(&format!("/rma/{other}/mark-payment"), &root, "quote.pdf", b"%PDF")
        .await?;
    let (status, body) = app.patch(&format!("/rma/{other}/mark-processing"), &root).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["purchase_order"].is_null(), "{body}");
    assert_eq!(app.stored_files(&other), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn losing_upload_leaves_no_file_behind() -> Result<()> {
    let app = common::spawn_app().await?;

    let (customer, _) = app.register("Customer", "customer@example.com").await?;
    let (root, _) = app.register_as("Root", "root@example.com", "SUPERADMIN").await?;

    for _ in 0..5 {
        let id = walk_to_evaluating(&app, &root, &customer).await?;
        let uri = format!("/rma/{id}/mark-payment");

        let (first, second) = tokio::join!(
            app.patch_file(&uri, &root, "quote-a.pdf", b"%PDF a"),
            app.patch_file(&uri, &root, "quote-b.pdf", b"%PDF b"),
        );
        let statuses = [first?.0, second?.0];

        let won = statuses.iter().filter(|s| **s == StatusCode::OK).count();
        assert_eq!(won, 1, "{statuses:?}");
        assert!(
            statuses.iter().all(|s| *s == StatusCode::OK || *s == StatusCode::CONFLICT),
            "{statuses:?}"
        );
        assert_eq!(app.stored_files(&id), 1, "rma {id}");

        let (_, body) = app.get(&format!("/rma/{id}"), &root).await?;
        assert_eq!(body["status"], "PAYMENT");
        let url = body["quote"]["url"].as_str().unwrap_or_default().to_string();
        let stored = url.rsplit('/').next().unwrap_or_default().to_string();
        assert!(app.dir.path().join("uploads").join(&id).join(stored).exists(), "{url}");
    }

    Ok(())
}
