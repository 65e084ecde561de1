use std::{error::Error, sync::Arc};

use actix_web::{
    delete,
    dev::{Server, ServerHandle, Service},
    get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use log::{debug, error, info};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use keystore_core::{actix_web, anyhow, log, serde_json, tokio, uuid, ApiKey};
use keystore_entity::UserEntry;
use keystore_store::{KeystoreRepository, SharedHealthReport, StoreError};

use crate::{check_api_key, HttpError, MetricsResponse, RequestMetrics, LOG_TARGET};

pub struct KeystoreHttpServer {
    inner: Server,
}

#[derive(Clone)]
pub struct KeystoreHttpServerData {
    api_key: Arc<ApiKey>,
    repository: KeystoreRepository,
    health: SharedHealthReport,
    metrics: RequestMetrics,
    started_at: Instant,
}

impl KeystoreHttpServerData {
    pub fn new(api_key: ApiKey, repository: KeystoreRepository, health: SharedHealthReport) -> Self {
        KeystoreHttpServerData {
            api_key: Arc::new(api_key),
            repository,
            health,
            metrics: RequestMetrics::new(),
            started_at: Instant::now(),
        }
    }
}

macro_rules! keystore_app {
    ($data:expr) => {{
        let data: web::Data<KeystoreHttpServerData> = $data;
        let metrics = data.metrics.clone();
        App::new()
            .app_data(data)
            .wrap_fn(move |req, srv| {
                let metrics = metrics.clone();
                let start = Instant::now();
                let id = Uuid::new_v4().simple().to_string();
                let method = req.method().to_string();
                let path = req.path().to_string();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;
                    let status = res.status().as_u16();
                    let endpoint = res
                        .request()
                        .match_pattern()
                        .unwrap_or_else(|| "unmatched".to_string());
                    metrics
                        .record(&method, &endpoint, status, start.elapsed())
                        .await;
                    debug!(
                        target: LOG_TARGET,
                        "{} {} {} {}ms {}",
                        id,
                        method,
                        status,
                        start.elapsed().as_millis(),
                        path
                    );
                    Ok(res)
                }
            })
            .service(
                web::scope("/user")
                    .service(user_exists)
                    .service(user_entry_get)
                    .service(user_entry_post)
                    .service(user_entry_delete),
            )
            .service(metrics_get)
            .service(ping)
    }};
}

impl KeystoreHttpServer {
    pub async fn new(data: KeystoreHttpServerData, http_addr: &str) -> anyhow::Result<Self> {
        let data = web::Data::new(data);
        let inner = HttpServer::new(move || keystore_app!(data.clone()))
            .disable_signals()
            .shutdown_timeout(5)
            .keep_alive(Duration::from_secs(5))
            .bind(http_addr)?
            .run();

        info!(target: LOG_TARGET, "Listening on {}", http_addr);
        Ok(KeystoreHttpServer { inner })
    }

    pub fn handle(&self) -> ServerHandle {
        self.inner.handle()
    }

    pub async fn listen(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(self.inner.await?)
    }
}

fn store_failure(op: &str, user_id: &str, err: StoreError) -> HttpError {
    error!(target: LOG_TARGET, "{} {} failed {}", op, user_id, err);
    HttpError::ServerError
}

#[get("/{user_id}/exists")]
async fn user_exists(
    state: web::Data<KeystoreHttpServerData>,
    req: HttpRequest,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    check_api_key(&req, &state.api_key)?;

    let user_id = path.into_inner();
    let exists = state
        .repository
        .exists(&user_id)
        .await
        .map_err(|err| store_failure("exists", &user_id, err))?;
    Ok(web::Json(exists))
}

#[get("/{user_id}/entry")]
async fn user_entry_get(
    state: web::Data<KeystoreHttpServerData>,
    req: HttpRequest,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    check_api_key(&req, &state.api_key)?;

    // Every failure answers 404, store failures are only distinguished in the log
    let user_id = path.into_inner();
    let entry = state.repository.get(&user_id).await.map_err(|err| {
        if !err.is_not_found() {
            error!(target: LOG_TARGET, "get {} failed {}", user_id, err);
        }
        HttpError::NotFound
    })?;
    Ok(web::Json(entry))
}

#[post("/{user_id}/entry")]
async fn user_entry_post(
    state: web::Data<KeystoreHttpServerData>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    check_api_key(&req, &state.api_key)?;

    let user_id = path.into_inner();
    let entry: UserEntry =
        serde_json::from_slice(&body).map_err(|err| HttpError::BadRequest(err.to_string()))?;
    if entry.user_id != user_id {
        return Err(HttpError::BadRequest(
            "User ID in URL does not match user ID in body".to_string(),
        )
        .into());
    }
    entry
        .validate()
        .map_err(|err| HttpError::BadRequest(err.to_string()))?;

    match state.repository.create(&entry).await {
        Ok(()) => {
            info!(target: LOG_TARGET, "Created entry for {}", user_id);
            Ok(HttpResponse::Ok().finish())
        }
        Err(StoreError::Conflict(_)) => {
            Err(HttpError::BadRequest("User already exists".to_string()).into())
        }
        Err(StoreError::InvalidEntry(err)) => Err(HttpError::BadRequest(err.to_string()).into()),
        Err(err) => Err(store_failure("create", &user_id, err).into()),
    }
}

#[delete("/{user_id}/entry")]
async fn user_entry_delete(
    state: web::Data<KeystoreHttpServerData>,
    req: HttpRequest,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    check_api_key(&req, &state.api_key)?;

    let user_id = path.into_inner();
    let removed = state
        .repository
        .delete(&user_id)
        .await
        .map_err(|err| store_failure("delete", &user_id, err))?;
    if removed == 0 {
        return Err(HttpError::NotFound.into());
    }
    info!(target: LOG_TARGET, "Deleted entry for {}", user_id);
    Ok(HttpResponse::Ok().finish())
}

#[get("/metrics")]
async fn metrics_get(
    state: web::Data<KeystoreHttpServerData>,
    req: HttpRequest,
) -> actix_web::Result<impl Responder> {
    check_api_key(&req, &state.api_key)?;

    Ok(web::Json(MetricsResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        health: state.health.read().await.clone(),
        requests: state.metrics.snapshot().await,
    }))
}

#[get("/ping")]
async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}
