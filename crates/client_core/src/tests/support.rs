//! Mock backend and scripted collaborators shared by the crate's tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{EntityKind, ExternalKey, ResolvedEntity, SessionToken},
    protocol::{EnrollmentRecord, LoginRequest},
};
use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    error::ClientError,
    gateway::{ApiGateway, AuthorizedGateway, GatewayConfig},
    registration::EnrollmentSubmitter,
    resolver::{EntityResolver, Resolution},
};

pub const VALID_TOKEN: &str = "tok-123";
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "secret123";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    persons: Arc<Mutex<HashMap<String, Value>>>,
    subjects: Arc<Mutex<HashMap<String, Value>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    submit_failure: Arc<Mutex<Option<(StatusCode, String)>>>,
    revoked: Arc<Mutex<bool>>,
}

impl MockBackend {
    pub fn with_person(self, cedula: &str, nombre: &str, apellido: &str) -> Self {
        self.persons.lock().expect("persons").insert(
            cedula.to_string(),
            json!({ "cedula": cedula, "nombre": nombre, "apellido": apellido }),
        );
        self
    }

    pub fn with_subject(self, codigo: &str, nombre: &str, creditos: u32) -> Self {
        self.subjects.lock().expect("subjects").insert(
            codigo.to_string(),
            json!({ "codigo": codigo, "nombre": nombre, "creditos": creditos }),
        );
        self
    }

    pub fn fail_submissions(&self, status: StatusCode, msg: &str) {
        *self.submit_failure.lock().expect("submit failure") = Some((status, msg.to_string()));
    }

    /// Every bearer call fails with 401 from now on.
    pub fn revoke_tokens(&self) {
        *self.revoked.lock().expect("revoked") = true;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    fn record(&self, method: &'static str, path: String, headers: &HeaderMap, body: Option<Value>) {
        let header_text = |name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().expect("requests").push(RecordedRequest {
            method,
            path,
            authorization: header_text(header::AUTHORIZATION),
            content_type: header_text(header::CONTENT_TYPE),
            body,
        });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        if *self.revoked.lock().expect("revoked") {
            return false;
        }
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {VALID_TOKEN}"))
    }

    pub async fn spawn(self) -> (String, MockBackend) {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new()
            .route("/", get(handle_root))
            .route("/login-admin", post(handle_login))
            .route("/estudiantes/:cedula", get(handle_person))
            .route("/materias/:codigo", get(handle_subject))
            .route("/matriculas/registrar", post(handle_register))
            .with_state(self.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), self)
    }
}

type Reply = (StatusCode, Json<Value>);

fn unauthorized() -> Reply {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "msg": "token expirado" })),
    )
}

async fn handle_root() -> &'static str {
    "recursos listos"
}

async fn handle_login(
    State(backend): State<MockBackend>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Reply {
    backend.record(
        "POST",
        "/login-admin".into(),
        &headers,
        serde_json::to_value(&body).ok(),
    );
    if body.username == ADMIN_USER && body.password == ADMIN_PASSWORD {
        (
            StatusCode::OK,
            Json(json!({ "tokenJWT": VALID_TOKEN, "msg": "bienvenido" })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "msg": "Usuario no registrado" })),
        )
    }
}

async fn handle_person(
    State(backend): State<MockBackend>,
    Path(cedula): Path<String>,
    headers: HeaderMap,
) -> Reply {
    backend.record("GET", format!("/estudiantes/{cedula}"), &headers, None);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let found = backend.persons.lock().expect("persons").get(&cedula).cloned();
    match found {
        Some(data) => (StatusCode::OK, Json(json!({ "data": data }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "msg": "Estudiante no encontrado" })),
        ),
    }
}

async fn handle_subject(
    State(backend): State<MockBackend>,
    Path(codigo): Path<String>,
    headers: HeaderMap,
) -> Reply {
    backend.record("GET", format!("/materias/{codigo}"), &headers, None);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if codigo == "BROKEN" {
        return (StatusCode::OK, Json(json!({ "data": "not-an-object" })));
    }
    if codigo == "CRASH" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "msg": "error interno" })),
        );
    }
    let found = backend.subjects.lock().expect("subjects").get(&codigo).cloned();
    match found {
        Some(data) => (StatusCode::OK, Json(json!({ "data": data }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "msg": "Materia no encontrada" })),
        ),
    }
}

async fn handle_register(
    State(backend): State<MockBackend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.record("POST", "/matriculas/registrar".into(), &headers, Some(body));
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if let Some((status, msg)) = backend.submit_failure.lock().expect("submit failure").clone() {
        return (status, Json(json!({ "msg": msg })));
    }
    (
        StatusCode::OK,
        Json(json!({ "msg": "Matrícula registrada con éxito" })),
    )
}

pub fn gateway_for(base_url: &str) -> ApiGateway {
    ApiGateway::new(GatewayConfig::new(base_url).expect("config")).expect("gateway")
}

pub fn authorized_gateway(base_url: &str) -> AuthorizedGateway {
    gateway_for(base_url).authorized(SessionToken::new(VALID_TOKEN).expect("token"))
}

pub fn person(cedula: &str, nombre: &str, apellido: &str) -> ResolvedEntity {
    let mut fields = BTreeMap::new();
    fields.insert("nombre".to_string(), nombre.to_string());
    fields.insert("apellido".to_string(), apellido.to_string());
    ResolvedEntity::new(EntityKind::Person, ExternalKey::from(cedula), fields)
}

pub fn subject(codigo: &str, nombre: &str) -> ResolvedEntity {
    let mut fields = BTreeMap::new();
    fields.insert("nombre".to_string(), nombre.to_string());
    ResolvedEntity::new(EntityKind::Subject, ExternalKey::from(codigo), fields)
}

#[derive(Debug, Clone, Copy)]
pub enum ScriptedFailure {
    Unauthorized,
    Backend,
}

impl ScriptedFailure {
    fn to_error(self) -> ClientError {
        match self {
            ScriptedFailure::Unauthorized => ClientError::Unauthorized {
                status: 401,
                message: "token expirado".into(),
            },
            ScriptedFailure::Backend => ClientError::Backend {
                status: 503,
                message: "servicio no disponible".into(),
            },
        }
    }
}

/// Resolver double: answers from a table and can hold a lookup until released.
#[derive(Default)]
pub struct ScriptedResolver {
    entities: Mutex<HashMap<(EntityKind, String), ResolvedEntity>>,
    failures: Mutex<HashMap<(EntityKind, String), ScriptedFailure>>,
    holds: Mutex<HashMap<EntityKind, VecDeque<oneshot::Receiver<()>>>>,
    calls: Mutex<Vec<(EntityKind, String)>>,
}

impl ScriptedResolver {
    pub fn with(self, entity: ResolvedEntity) -> Self {
        self.entities
            .lock()
            .expect("entities")
            .insert((entity.kind, entity.external_key.0.clone()), entity);
        self
    }

    pub fn failing(self, kind: EntityKind, key: &str, failure: ScriptedFailure) -> Self {
        self.failures
            .lock()
            .expect("failures")
            .insert((kind, key.to_string()), failure);
        self
    }

    /// The next lookup of `kind` waits until the returned sender fires or drops.
    pub fn hold(&self, kind: EntityKind) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.holds
            .lock()
            .expect("holds")
            .entry(kind)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<(EntityKind, String)> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl EntityResolver for ScriptedResolver {
    async fn resolve(
        &self,
        kind: EntityKind,
        external_key: &ExternalKey,
    ) -> Result<Resolution, ClientError> {
        self.calls
            .lock()
            .expect("calls")
            .push((kind, external_key.0.clone()));
        let hold = self
            .holds
            .lock()
            .expect("holds")
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        if let Some(hold) = hold {
            let _ = hold.await;
        }

        let lookup = (kind, external_key.0.clone());
        if let Some(failure) = self.failures.lock().expect("failures").get(&lookup) {
            return Err(failure.to_error());
        }
        Ok(self
            .entities
            .lock()
            .expect("entities")
            .get(&lookup)
            .cloned()
            .map(Resolution::Resolved)
            .unwrap_or(Resolution::NotFound))
    }
}

/// Submitter double: records every record and answers from a queue (default success).
#[derive(Default)]
pub struct ScriptedSubmitter {
    replies: Mutex<VecDeque<Result<String, ScriptedFailure>>>,
    holds: Mutex<VecDeque<oneshot::Receiver<()>>>,
    records: Mutex<Vec<EnrollmentRecord>>,
}

impl ScriptedSubmitter {
    pub fn reply(self, reply: Result<&str, ScriptedFailure>) -> Self {
        self.replies
            .lock()
            .expect("replies")
            .push_back(reply.map(str::to_string));
        self
    }

    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.holds.lock().expect("holds").push_back(rx);
        tx
    }

    pub fn records(&self) -> Vec<EnrollmentRecord> {
        self.records.lock().expect("records").clone()
    }
}

#[async_trait]
impl EnrollmentSubmitter for ScriptedSubmitter {
    async fn submit(&self, record: &EnrollmentRecord) -> Result<String, ClientError> {
        self.records.lock().expect("records").push(record.clone());
        let hold = self.holds.lock().expect("holds").pop_front();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        let reply = self.replies.lock().expect("replies").pop_front();
        match reply {
            Some(Ok(message)) => Ok(message),
            Some(Err(failure)) => Err(failure.to_error()),
            None => Ok("registered".to_string()),
        }
    }
}
