use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use client_core::{AuthStatus, GatewayConfig, MemoryCredentialStore, SessionStore};
use serde_json::{json, Value};
use shared::domain::{ExternalKey, SessionToken};
use tokio::net::TcpListener;

use super::*;

#[derive(Clone, Default)]
struct Backend {
    hits: Arc<Mutex<Vec<String>>>,
    submitted: Arc<Mutex<Vec<Value>>>,
}

impl Backend {
    fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hits").clone()
    }
}

fn check(backend: &Backend, path: String, headers: &HeaderMap) -> Option<(StatusCode, Json<Value>)> {
    backend.hits.lock().expect("hits").push(path);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer good-token");
    (!authorized).then(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "msg": "token expirado" })),
        )
    })
}

async fn person(
    State(backend): State<Backend>,
    Path(cedula): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Some(rejected) = check(&backend, format!("/estudiantes/{cedula}"), &headers) {
        return rejected;
    }
    if cedula == "0102030405" {
        (
            StatusCode::OK,
            Json(json!({ "data": { "nombre": "Ana", "apellido": "Mora" } })),
        )
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "msg": "no existe" })))
    }
}

async fn subject(
    State(backend): State<Backend>,
    Path(codigo): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Some(rejected) = check(&backend, format!("/materias/{codigo}"), &headers) {
        return rejected;
    }
    if codigo == "MAT102" {
        (
            StatusCode::OK,
            Json(json!({ "data": { "nombre": "Calculo II", "creditos": 4 } })),
        )
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "msg": "no existe" })))
    }
}

async fn register_enrollment(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(rejected) = check(&backend, "/matriculas/registrar".into(), &headers) {
        return rejected;
    }
    backend.submitted.lock().expect("submitted").push(body);
    (StatusCode::OK, Json(json!({ "msg": "Matrícula registrada" })))
}

async fn spawn_backend() -> (ApiGateway, Backend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let backend = Backend::default();
    let app = Router::new()
        .route("/estudiantes/:cedula", get(person))
        .route("/materias/:codigo", get(subject))
        .route("/matriculas/registrar", post(register_enrollment))
        .with_state(backend.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let config = GatewayConfig::new(&format!("http://{addr}")).expect("config");
    (ApiGateway::new(config).expect("gateway"), backend)
}

async fn gate_with(token: Option<&str>) -> (AuthGate, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let mut session = SessionStore::new(store.clone());
    if let Some(token) = token {
        session
            .set_session(SessionToken::new(token).expect("token"))
            .await
            .expect("session");
    }
    (AuthGate::new(session), store)
}

fn args(cedula: &str, materia: &str, creditos: &str) -> RegisterArgs {
    RegisterArgs {
        cedula: cedula.into(),
        materia: materia.into(),
        matricula: "M-2024-01".into(),
        descripcion: "primer semestre".into(),
        creditos: creditos.into(),
    }
}

#[test]
fn cedula_must_be_ten_digits() {
    assert_eq!(validate_cedula(" 0102030405 ").expect("valid"), "0102030405");
    assert!(validate_cedula("010203040").is_err());
    assert!(validate_cedula("01020304056").is_err());
    assert!(validate_cedula("01020304a5").is_err());
    assert!(validate_cedula("０１０２０３０４０５").is_err());
}

#[test]
fn describe_lists_non_empty_fields() {
    let mut fields = BTreeMap::new();
    fields.insert("nombre".to_string(), "Ana".to_string());
    fields.insert("apellido".to_string(), String::new());
    let entity = ResolvedEntity::new(EntityKind::Person, ExternalKey::from("0102030405"), fields);

    assert_eq!(describe(&entity), "person 0102030405 [nombre=Ana]");
}

#[tokio::test]
async fn unauthenticated_register_redirects_without_requests() {
    let (gateway, backend) = spawn_backend().await;
    let (mut gate, _) = gate_with(None).await;

    let err = run(&mut gate, &gateway, &args("0102030405", "MAT102", "4"))
        .await
        .expect_err("not logged in");

    assert!(err.to_string().contains(LOGIN_ROUTE));
    assert!(backend.hits().is_empty());
}

#[tokio::test]
async fn malformed_cedula_is_rejected_before_lookup() {
    let (gateway, backend) = spawn_backend().await;
    let (mut gate, _) = gate_with(Some("good-token")).await;

    let err = run(&mut gate, &gateway, &args("12345", "MAT102", "4"))
        .await
        .expect_err("bad cedula");

    assert!(err.to_string().contains("10 digits"));
    assert!(backend.hits().is_empty());
}

#[tokio::test]
async fn registers_when_both_dependencies_resolve() {
    let (gateway, backend) = spawn_backend().await;
    let (mut gate, _) = gate_with(Some("good-token")).await;

    let message = run(&mut gate, &gateway, &args("0102030405", "MAT102", "4"))
        .await
        .expect("register");

    assert_eq!(message, "Matrícula registrada");
    let submitted = backend.submitted.lock().expect("submitted").clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["codigoMateria"], "MAT102");
    assert_eq!(submitted[0]["creditos"], 4.0);
}

#[tokio::test]
async fn unknown_subject_blocks_submission() {
    let (gateway, backend) = spawn_backend().await;
    let (mut gate, _) = gate_with(Some("good-token")).await;

    let err = run(&mut gate, &gateway, &args("0102030405", "MAT101", "4"))
        .await
        .expect_err("subject missing");

    assert!(err.to_string().contains("subject"));
    assert!(!backend
        .hits()
        .contains(&"/matriculas/registrar".to_string()));
}

#[tokio::test]
async fn negative_credits_fail_locally() {
    let (gateway, backend) = spawn_backend().await;
    let (mut gate, _) = gate_with(Some("good-token")).await;

    let err = run(&mut gate, &gateway, &args("0102030405", "MAT102", "-1"))
        .await
        .expect_err("negative credits");

    assert!(format!("{err:#}").contains("credits"));
    assert!(backend.submitted.lock().expect("submitted").is_empty());
    assert_eq!(gate.status(), AuthStatus::Authenticated);
}

#[tokio::test]
async fn rejected_token_clears_the_session() {
    let (gateway, _backend) = spawn_backend().await;
    let (mut gate, store) = gate_with(Some("expired-token")).await;

    let err = run(&mut gate, &gateway, &args("0102030405", "MAT102", "4"))
        .await
        .expect_err("401");

    assert!(err.to_string().contains("session expired"));
    assert_eq!(gate.status(), AuthStatus::Unauthenticated);
    assert!(store.get(client_core::TOKEN_KEY).is_none());
}
