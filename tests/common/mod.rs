#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;

use rma_service::{create_app_with_config, AppConfig};

pub const BOUNDARY: &str = "rma-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub dir: TempDir,
}

pub async fn pool_in(dir: &TempDir) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    Ok(pool)
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let pool = pool_in(&dir).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let config = AppConfig {
        upload_dir: dir.path().join("uploads"),
        ..AppConfig::default()
    };
    let app = create_app_with_config(pool.clone(), config).await?;

    Ok(TestApp { app, pool, dir })
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Result<(StatusCode, Value)> {
        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, value))
    }

    pub async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string()))?).await
    }

    /// Send `body` verbatim as JSON, for payloads `serde_json` would refuse to build
    pub async fn raw(&self, method: &str, uri: &str, token: Option<&str>, body: &str) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string()))?).await
    }

    /// Files stored on disk for one RMA
    pub fn stored_files(&self, rma_id: &str) -> usize {
        std::fs::read_dir(self.dir.path().join("uploads").join(rma_id))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())?;
        self.send(req).await
    }

    pub async fn patch(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        let req = Request::builder()
            .method("PATCH")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())?;
        self.send(req).await
    }

    pub async fn patch_file(&self, uri: &str, token: &str, filename: &str, data: &[u8]) -> Result<(StatusCode, Value)> {
        let req = Request::builder()
            .method("PATCH")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(filename, data)))?;
        self.send(req).await
    }

    /// Register a user and return (token, user id)
    pub async fn register(&self, name: &str, email: &str) -> Result<(String, String)> {
        let (status, body) = self
            .json(
                "POST",
                "/auth/register",
                None,
                json!({ "name": name, "email": email, "password": "password123" }),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        let token = body["token"].as_str().context("token missing")?.to_string();
        let user_id = body["user"]["id"].as_str().context("user id missing")?.to_string();
        Ok((token, user_id))
    }

    /// Register a user and store `role` for it directly
    pub async fn register_as(&self, name: &str, email: &str, role: &str) -> Result<(String, String)> {
        let (token, user_id) = self.register(name, email).await?;
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(&user_id)
            .execute(&self.pool)
            .await?;
        Ok((token, user_id))
    }

    pub async fn create_rma(&self, token: &str) -> Result<String> {
        let (status, body) = self.json("POST", "/rma", Some(token), sample_rma()).await?;
        assert_eq!(status, StatusCode::CREATED, "create rma failed: {body}");
        Ok(body["id"].as_str().context("rma id missing")?.to_string())
    }
}

pub fn sample_rma() -> Value {
    json!({
        "company_name": "Tech Solutions S.A.",
        "address": "Av. Reforma 123, Col. Centro",
        "postal_code": "06000",
        "service_type": "REPAIR",
        "items": [{
            "product_id": "11111111-1111-1111-1111-111111111111",
            "serial_number": "SN-99812",
            "model": "FX-200"
        }]
    })
}

pub fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}
