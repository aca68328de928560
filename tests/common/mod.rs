use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use jobcoach::auth::jwt::JwtService;
use jobcoach::auth::password::hash_password;
use jobcoach::clients::{
    AnalysisModel, AnalyzeResult, ChatCompletion, ChatMessage, ClientResult, DocumentAnalyzer,
    SentimentResult, TextAnalytics,
};
use jobcoach::config::AppConfig;
use jobcoach::critique::{GatePolicy, LocalCritiqueGate};
use jobcoach::db::{self, PgPool, MIGRATIONS};
use jobcoach::models::{Job, NewUser};
use jobcoach::routes;
use jobcoach::state::{AppState, ExternalClients};
use jobcoach::storage::ObjectStorage;
use jobcoach::{default_handlers, Worker};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        _content_disposition: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        ensure!(
            !self.fail_deletes.load(Ordering::SeqCst),
            "storage unavailable"
        );
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

#[allow(dead_code)]
impl FakeStorage {
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) {
        self.objects.lock().await.remove(key);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

/// Returns a fixed OCR text for every binary upload.
pub struct FakeAnalyzer {
    pub content: String,
}

#[async_trait]
impl DocumentAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _url: &str, _model: AnalysisModel) -> ClientResult<AnalyzeResult> {
        Ok(AnalyzeResult {
            content: self.content.clone(),
            ..AnalyzeResult::default()
        })
    }
}

pub struct FakeTextAnalytics;

#[async_trait]
impl TextAnalytics for FakeTextAnalytics {
    async fn key_phrases(&self, _text: &str) -> ClientResult<Vec<String>> {
        Ok(vec!["five years of experience".to_string()])
    }

    async fn sentiment(&self, _text: &str) -> ClientResult<SentimentResult> {
        Ok(SentimentResult::neutral())
    }
}

/// Answers with a canned critique and counts how often it was asked.
#[derive(Default)]
pub struct FakeChat {
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeChat {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> ClientResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(r#"```json
{"summary": "Solid resume", "strengths": ["clear layout"], "improvements": ["add metrics"], "score": 72}
```"#
            .to_string())
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    chat: Arc<FakeChat>,
    worker: Worker,
}

#[allow(dead_code)]
impl TestApp {
    /// Returns `None` when no test database is configured.
    pub async fn new() -> Result<Option<Self>> {
        Self::with_cooldown(0).await
    }

    pub async fn with_cooldown(critique_cooldown_secs: u64) -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            max_upload_bytes: 10 * 1024 * 1024,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            signed_url_ttl_minutes: 15,
            form_recognizer_endpoint: None,
            form_recognizer_key: None,
            form_recognizer_api_version: "2023-07-31".to_string(),
            language_endpoint: None,
            language_key: None,
            language_api_version: "2023-04-01".to_string(),
            openai_endpoint: None,
            openai_key: None,
            openai_deployment: "test".to_string(),
            openai_api_version: "2024-02-15-preview".to_string(),
            critique_cooldown_secs,
            critique_cache_days: 7,
            critique_lease_secs: 120,
            critique_gate_local: true,
            notification_heartbeat_secs: 30,
            worker_poll_interval_secs: 1,
            job_stale_after_secs: 600,
            run_worker_in_process: false,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let chat = Arc::new(FakeChat::default());
        let clients = ExternalClients {
            analyzer: Arc::new(FakeAnalyzer {
                content: "Work experience: five years of Rust and SQL. Skills: docker. Education: BSc"
                    .to_string(),
            }),
            text_analytics: Arc::new(FakeTextAnalytics),
            chat: chat.clone(),
        };
        let jwt = JwtService::from_config(&config)?;
        let gate = Arc::new(LocalCritiqueGate::new(GatePolicy::from_config(&config)));
        let state = AppState::new(pool, config, storage.clone(), jwt, clients, gate);
        let router = routes::create_router(state.clone());
        let worker = Worker::new(Arc::new(state.clone()), default_handlers());

        Ok(Some(Self {
            state,
            router,
            storage,
            chat,
            worker,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn chat(&self) -> Arc<FakeChat> {
        self.chat.clone()
    }

    /// Runs queued jobs until the queue is drained.
    pub async fn drain_jobs(&self) -> Result<usize> {
        let mut processed = 0;
        while self.worker.run_once().await? {
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn insert_user(&self, email: &str, password: &str, role: &str) -> Result<Uuid> {
        let email = email.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                name: email.split('@').next().unwrap_or("user").to_string(),
                email,
                password_hash,
                role,
            };
            diesel::insert_into(jobcoach::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    /// Inserts a user and logs them in.
    pub async fn user_with_token(&self, email: &str, role: &str) -> Result<(Uuid, String)> {
        let password = "correct-horse";
        let id = self.insert_user(email, password, role).await?;
        let token = self.login_token(email, password).await?;
        Ok((id, token))
    }

    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use jobcoach::schema::jobs::dsl::{created_at, job_type, jobs};
            jobs.filter(job_type.eq(&ty))
                .order(created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")
        })
        .await
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(body.map(Body::from).unwrap_or_else(Body::empty))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::POST, path, Some(body), token).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::PUT, path, Some(body), token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::PATCH, path, Some(body), token).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, None, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, None, token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, None, token).await
    }

    pub async fn upload_document(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        title: Option<&str>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        if let Some(title) = title {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
            body.extend(title.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/documents")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn read_json<T: serde::de::DeserializeOwned>(
    response: hyper::Response<Body>,
) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body)
        .with_context(|| format!("unexpected body: {}", String::from_utf8_lossy(&body)))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE messages, conversations, matches, assessment_results, seeker_profiles, \
         coach_profiles, documents, jobs, service_leases, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
