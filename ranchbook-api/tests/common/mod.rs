//! Common test utilities for integration tests
//!
//! Tests drive the full router (auth layer included) with
//! `tower::Service::call` against the database in `DATABASE_URL`. When the
//! variable is not set, [`TestContext::new`] returns `None` and the test
//! returns early.
//!
//! Every context owns two users, each administrator of their own farm:
//!
//! - `a` on farm `a.farm`
//! - `b` on farm `b.farm`

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use ranchbook_api::app::{build_router, AppState};
use ranchbook_api::config::{ApiConfig, Config, DatabaseConfig, JwtConfig};
use ranchbook_shared::auth::jwt::{create_token, Claims, TokenType};
use ranchbook_shared::auth::middleware::Principal;
use ranchbook_shared::db::migrations::run_migrations;
use ranchbook_shared::models::farm::{CreateFarm, Farm};
use ranchbook_shared::models::user::{CreateUser, User};
use serde_json::Value;
use sqlx::PgPool;
use tower::Service as _;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// A user with one farm and an access token scoped to it
pub struct Actor {
    pub user: User,
    pub farm: Farm,
    pub token: String,
}

impl Actor {
    async fn create(db: &PgPool, label: &str) -> anyhow::Result<Self> {
        let user = User::create(
            db,
            CreateUser {
                email: format!("{}-{}@example.com", label, Uuid::new_v4()),
                password_hash: "unused".to_string(),
                name: Some(label.to_string()),
            },
        )
        .await?;

        let principal = Principal::new(user.id, None, user.email.clone());
        let farm = Farm::create(
            db,
            &principal,
            CreateFarm {
                name: format!("Fazenda {}", label),
                location: None,
                area_hectares: None,
            },
        )
        .await?;

        let token = token_for(&user, Some(farm.id))?;
        Ok(Self { user, farm, token })
    }
}

pub fn token_for(user: &User, farm_id: Option<Uuid>) -> anyhow::Result<String> {
    let claims = Claims::new(user.id, user.email.clone(), farm_id, TokenType::Access);
    Ok(create_token(&claims, TEST_SECRET)?)
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub a: Actor,
    pub b: Actor,
}

impl TestContext {
    pub async fn new() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(Self::connect(url).await.expect("Failed to set up test context"))
    }

    async fn connect(url: String) -> anyhow::Result<Self> {
        let db = PgPool::connect(&url).await?;
        run_migrations(&db).await?;

        let config = Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["*".to_string()],
                production: false,
                json_logs: false,
            },
            database: DatabaseConfig {
                url,
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: TEST_SECRET.to_string(),
            },
        };

        let a = Actor::create(&db, "ana").await?;
        let b = Actor::create(&db, "bruno").await?;
        let app = build_router(AppState::new(db.clone(), config));

        Ok(Self { db, app, a, b })
    }

    /// Sends a request and returns the status and raw body
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, headers, bytes.to_vec())
    }

    /// Sends a request and parses the JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send_raw(method, uri, Some(token), body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> StatusCode {
        self.send(Method::DELETE, uri, token, None).await.0
    }

    /// Creates a record and returns its id, panicking on failure
    pub async fn create(&self, uri: &str, token: &str, body: Value) -> Uuid {
        let (status, json) = self.post(uri, token, body).await;
        assert_eq!(status, StatusCode::CREATED, "POST {} failed: {}", uri, json);
        json["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("response carries an id")
    }

    /// Deletes both farms (cascading to their records) and both users
    pub async fn cleanup(self) {
        sqlx::query("DELETE FROM farms WHERE id = ANY($1)")
            .bind(vec![self.a.farm.id, self.b.farm.id])
            .execute(&self.db)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(vec![self.a.user.id, self.b.user.id])
            .execute(&self.db)
            .await
            .unwrap();
    }
}
