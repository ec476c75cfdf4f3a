use async_trait::async_trait;
use shared::{
    domain::{EntityKind, ExternalKey, ResolvedEntity},
    protocol::{PersonRecord, SubjectRecord},
};
use tracing::info;

use crate::{
    error::{ClientError, ValidationErrors},
    gateway::AuthorizedGateway,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedEntity),
    NotFound,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// One lookup per call: no caching, no retry.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(
        &self,
        kind: EntityKind,
        external_key: &ExternalKey,
    ) -> Result<Resolution, ClientError>;
}

pub fn lookup_path(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Person => "estudiantes",
        EntityKind::Subject => "materias",
    }
}

pub struct HttpEntityResolver {
    gateway: AuthorizedGateway,
}

impl HttpEntityResolver {
    pub fn new(gateway: AuthorizedGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl EntityResolver for HttpEntityResolver {
    async fn resolve(
        &self,
        kind: EntityKind,
        external_key: &ExternalKey,
    ) -> Result<Resolution, ClientError> {
        if external_key.as_str().is_empty() {
            return Err(ClientError::Validation(ValidationErrors::single(
                kind.as_str(),
                "lookup key must not be empty",
            )));
        }

        let segments = [lookup_path(kind), external_key.as_str()];
        let resolved = match kind {
            EntityKind::Person => self
                .gateway
                .get_data::<PersonRecord>(&segments)
                .await?
                .map(|record| record.into_resolved(external_key.clone())),
            EntityKind::Subject => self
                .gateway
                .get_data::<SubjectRecord>(&segments)
                .await?
                .map(|record| record.into_resolved(external_key.clone())),
        };

        info!(
            kind = %kind,
            key = %external_key,
            found = resolved.is_some(),
            "resolver: lookup finished"
        );
        Ok(match resolved {
            Some(entity) => Resolution::Resolved(entity),
            None => Resolution::NotFound,
        })
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
