use std::{
    cell::{Cell, RefCell},
    sync::Arc,
};

use async_trait::async_trait;
use shared::{
    domain::{EntityKind, ResolvedEntity},
    protocol::EnrollmentRecord,
};
use tracing::{info, warn};

use super::workflow::{
    FieldEdit, LookupCompletion, RegistrationWorkflow, SubmissionOutcome, WorkflowState,
};
use crate::{
    error::{ClientError, RejectReason},
    gateway::AuthorizedGateway,
    resolver::{EntityResolver, HttpEntityResolver, Resolution},
};

pub const SUBMIT_PATH: [&str; 2] = ["matriculas", "registrar"];
const DEFAULT_SUBMITTED_MESSAGE: &str = "enrollment registered";

#[async_trait]
pub trait EnrollmentSubmitter: Send + Sync {
    /// Returns the backend's user-facing confirmation text.
    async fn submit(&self, record: &EnrollmentRecord) -> Result<String, ClientError>;
}

pub struct HttpEnrollmentSubmitter {
    gateway: AuthorizedGateway,
}

impl HttpEnrollmentSubmitter {
    pub fn new(gateway: AuthorizedGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl EnrollmentSubmitter for HttpEnrollmentSubmitter {
    async fn submit(&self, record: &EnrollmentRecord) -> Result<String, ClientError> {
        let body = self.gateway.post_json(&SUBMIT_PATH, record).await?;
        Ok(body
            .msg
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBMITTED_MESSAGE.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupReport {
    Resolved(ResolvedEntity),
    NotFound,
    /// The view was reset or the lookup superseded before the result arrived.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReport {
    Submitted { message: String },
    Discarded,
}

/// Async driver over [`RegistrationWorkflow`] for a single-threaded executor.
///
/// Borrows of the workflow never cross an `.await`, so two lookups joined on
/// the same task interleave freely and each completion is applied atomically.
pub struct RegistrationController {
    workflow: RefCell<RegistrationWorkflow>,
    resolver: Arc<dyn EntityResolver>,
    submitter: Arc<dyn EnrollmentSubmitter>,
    mounted: Cell<bool>,
}

impl RegistrationController {
    pub fn new(resolver: Arc<dyn EntityResolver>, submitter: Arc<dyn EnrollmentSubmitter>) -> Self {
        Self {
            workflow: RefCell::new(RegistrationWorkflow::new()),
            resolver,
            submitter,
            mounted: Cell::new(true),
        }
    }

    pub fn over_http(gateway: AuthorizedGateway) -> Self {
        Self::new(
            Arc::new(HttpEntityResolver::new(gateway.clone())),
            Arc::new(HttpEnrollmentSubmitter::new(gateway)),
        )
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub fn state(&self) -> WorkflowState {
        self.workflow.borrow().state()
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&RegistrationWorkflow) -> R) -> R {
        f(&self.workflow.borrow())
    }

    fn ensure_mounted(&self) -> Result<(), ClientError> {
        if self.mounted.get() {
            Ok(())
        } else {
            Err(ClientError::Rejected(RejectReason::Unmounted))
        }
    }

    pub fn edit(&self, edit: FieldEdit) -> Result<(), ClientError> {
        self.ensure_mounted()?;
        self.workflow.borrow_mut().apply_edit(edit)
    }

    /// Sets the key for `kind` and validates it against the backend.
    pub async fn lookup(
        &self,
        kind: EntityKind,
        key: impl Into<String>,
    ) -> Result<LookupReport, ClientError> {
        let key = key.into();
        let edit = match kind {
            EntityKind::Person => FieldEdit::PersonKey(key),
            EntityKind::Subject => FieldEdit::SubjectKey(key),
        };
        self.edit(edit)?;
        self.resolve(kind).await
    }

    /// Resolves the key currently entered for `kind`.
    ///
    /// Errors are still returned when the result itself is discarded, so an
    /// authorization failure always reaches the caller.
    pub async fn resolve(&self, kind: EntityKind) -> Result<LookupReport, ClientError> {
        self.ensure_mounted()?;
        let ticket = self.workflow.borrow_mut().begin_lookup(kind)?;
        info!(kind = %kind, key = %ticket.key, "registration: lookup started");

        let result = self.resolver.resolve(kind, &ticket.key).await;

        let completion = match &result {
            Ok(Resolution::Resolved(entity)) => LookupCompletion::Resolved(entity.clone()),
            Ok(Resolution::NotFound) => LookupCompletion::NotFound,
            Err(err) => LookupCompletion::Failed(err.user_message()),
        };
        let applied = self.mounted.get()
            && self
                .workflow
                .borrow_mut()
                .complete_lookup(&ticket, completion);
        if !applied {
            info!(kind = %kind, key = %ticket.key, "registration: stale lookup result discarded");
        }

        match result {
            Err(err) => {
                warn!(kind = %kind, error = %err, "registration: lookup failed");
                Err(err)
            }
            Ok(_) if !applied => Ok(LookupReport::Discarded),
            Ok(Resolution::Resolved(entity)) => Ok(LookupReport::Resolved(entity)),
            Ok(Resolution::NotFound) => Ok(LookupReport::NotFound),
        }
    }

    /// Only one submission may be in flight; a second call is rejected untouched.
    pub async fn submit(&self) -> Result<SubmitReport, ClientError> {
        self.ensure_mounted()?;
        let ticket = self.workflow.borrow_mut().begin_submit()?;
        info!(
            cedula = %ticket.record.cedula,
            materia = %ticket.record.codigo_materia,
            "registration: submission started"
        );

        let result = self.submitter.submit(&ticket.record).await;

        let outcome = if self.mounted.get() {
            let completion = result.as_ref().cloned().map_err(ClientError::user_message);
            self.workflow
                .borrow_mut()
                .complete_submit(&ticket, completion)
        } else {
            None
        };

        match (result, outcome) {
            (Err(err), _) => {
                warn!(error = %err, "registration: submission failed");
                Err(err)
            }
            (Ok(_), Some(SubmissionOutcome::Submitted { message })) => {
                info!("registration: submission accepted; draft reset");
                Ok(SubmitReport::Submitted { message })
            }
            (Ok(_), _) => {
                info!("registration: stale submission result discarded");
                Ok(SubmitReport::Discarded)
            }
        }
    }

    /// Starts a fresh cycle; in-flight lookup results for the old draft are
    /// dropped. Rejected while a submission is in flight.
    pub fn reset(&self) -> Result<(), ClientError> {
        self.ensure_mounted()?;
        self.workflow.borrow_mut().reset()
    }

    /// Tears the view down. Late results are dropped and further calls rejected.
    pub fn unmount(&self) {
        self.mounted.set(false);
        self.workflow.borrow_mut().abandon();
    }
}

#[cfg(test)]
#[path = "../tests/controller_tests.rs"]
mod tests;
