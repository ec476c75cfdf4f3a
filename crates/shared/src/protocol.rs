use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{EntityKind, ExternalKey, ResolvedEntity};

/// Body shape shared by every backend response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Used when only `msg` matters; any `data` payload is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "tokenJWT")]
    pub token_jwt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Student record returned by `GET /estudiantes/{cedula}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cedula: Option<String>,
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
}

/// Course record returned by `GET /materias/{codigo}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    pub nombre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creditos: Option<serde_json::Value>,
}

impl PersonRecord {
    pub fn into_resolved(self, key: ExternalKey) -> ResolvedEntity {
        let mut fields = BTreeMap::new();
        fields.insert("nombre".to_string(), self.nombre);
        fields.insert("apellido".to_string(), self.apellido);
        ResolvedEntity::new(EntityKind::Person, key, fields)
    }
}

impl SubjectRecord {
    pub fn into_resolved(self, key: ExternalKey) -> ResolvedEntity {
        let mut fields = BTreeMap::new();
        fields.insert("nombre".to_string(), self.nombre);
        match self.creditos {
            Some(serde_json::Value::String(s)) => {
                fields.insert("creditos".to_string(), s);
            }
            Some(serde_json::Value::Number(n)) => {
                fields.insert("creditos".to_string(), n.to_string());
            }
            _ => {}
        }
        ResolvedEntity::new(EntityKind::Subject, key, fields)
    }
}

/// Composite record posted to `POST /matriculas/registrar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub cedula: String,
    pub codigo_materia: String,
    pub codigo_matricula: String,
    pub descripcion: String,
    pub creditos: f64,
}
