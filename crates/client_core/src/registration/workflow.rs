//! Pure state machine behind the enrollment registration screen.

use shared::{
    domain::{EntityKind, ExternalKey, ResolvedEntity},
    protocol::EnrollmentRecord,
};

use crate::error::{ClientError, RejectReason, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Idle,
    Pending,
    Resolved,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DependencyStatus {
    #[default]
    Idle,
    Pending {
        key: ExternalKey,
    },
    Resolved(ResolvedEntity),
    NotFound {
        key: ExternalKey,
    },
    Failed {
        key: ExternalKey,
        message: String,
    },
}

impl DependencyStatus {
    pub fn state(&self) -> DependencyState {
        match self {
            DependencyStatus::Idle => DependencyState::Idle,
            DependencyStatus::Pending { .. } => DependencyState::Pending,
            DependencyStatus::Resolved(_) => DependencyState::Resolved,
            DependencyStatus::NotFound { .. } => DependencyState::NotFound,
            DependencyStatus::Failed { .. } => DependencyState::Failed,
        }
    }

    pub fn key(&self) -> Option<&ExternalKey> {
        match self {
            DependencyStatus::Idle => None,
            DependencyStatus::Pending { key }
            | DependencyStatus::NotFound { key }
            | DependencyStatus::Failed { key, .. } => Some(key),
            DependencyStatus::Resolved(entity) => Some(&entity.external_key),
        }
    }

    pub fn entity(&self) -> Option<&ResolvedEntity> {
        match self {
            DependencyStatus::Resolved(entity) if entity.resolved => Some(entity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// No lookup attempted yet.
    Empty,
    Resolving {
        person: DependencyState,
        subject: DependencyState,
    },
    Ready,
    Submitting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    PersonKey(String),
    SubjectKey(String),
    EnrollmentCode(String),
    Description(String),
    Credits(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupCompletion {
    Resolved(ResolvedEntity),
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    pub kind: EntityKind,
    pub key: ExternalKey,
    generation: u64,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitTicket {
    pub record: EnrollmentRecord,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted { message: String },
    Failed { message: String },
}

/// Locally entered fields, kept as typed text until submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftFields {
    pub enrollment_code: String,
    pub description: String,
    pub credits: String,
}

impl DraftFields {
    fn is_complete(&self) -> bool {
        !self.enrollment_code.trim().is_empty()
            && !self.description.trim().is_empty()
            && !self.credits.trim().is_empty()
    }

    pub fn validate(&self) -> Result<(String, String, f64), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let code = self.enrollment_code.trim();
        let description = self.description.trim();
        if code.is_empty() {
            errors.push("enrollment_code", "enrollment code is required");
        }
        if description.is_empty() {
            errors.push("description", "description is required");
        }
        let credits = match self.credits.trim() {
            "" => {
                errors.push("credits", "credits are required");
                None
            }
            raw => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() && value > 0.0 => Some(value),
                Ok(_) => {
                    errors.push("credits", "credits must be a positive number");
                    None
                }
                Err(_) => {
                    errors.push("credits", "credits must be a number");
                    None
                }
            },
        };

        match credits {
            Some(credits) if errors.is_empty() => {
                Ok((code.to_string(), description.to_string(), credits))
            }
            _ => Err(errors),
        }
    }
}

/// Snapshot of the draft in the shape of the composite record being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDraft {
    pub person_ref: Option<ResolvedEntity>,
    pub subject_ref: Option<ResolvedEntity>,
    pub enrollment_code: String,
    pub description: String,
    pub credits: String,
}

#[derive(Debug, Clone, Default)]
struct Dependency {
    input: String,
    status: DependencyStatus,
    seq: u64,
}

impl Dependency {
    fn set_input(&mut self, input: String) {
        let changed = self
            .status
            .key()
            .is_some_and(|key| key.as_str() != input.trim());
        if changed {
            self.status = DependencyStatus::Idle;
            self.seq += 1;
        }
        self.input = input;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationWorkflow {
    generation: u64,
    person: Dependency,
    subject: Dependency,
    fields: DraftFields,
    submitting: bool,
    validation_errors: Option<ValidationErrors>,
    last_submission: Option<SubmissionOutcome>,
}

fn key_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Person => "person_key",
        EntityKind::Subject => "subject_key",
    }
}

impl RegistrationWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkflowState {
        if self.submitting {
            return WorkflowState::Submitting;
        }
        let person = self.person.status.state();
        let subject = self.subject.status.state();
        match (person, subject) {
            (DependencyState::Idle, DependencyState::Idle) => WorkflowState::Empty,
            (DependencyState::Resolved, DependencyState::Resolved)
                if self.fields.is_complete() =>
            {
                WorkflowState::Ready
            }
            _ => WorkflowState::Resolving { person, subject },
        }
    }

    pub fn can_submit(&self) -> bool {
        self.state() == WorkflowState::Ready
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self, kind: EntityKind) -> &DependencyStatus {
        &self.slot(kind).status
    }

    pub fn input(&self, kind: EntityKind) -> &str {
        &self.slot(kind).input
    }

    pub fn fields(&self) -> &DraftFields {
        &self.fields
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        self.validation_errors.as_ref()
    }

    /// Outcome of the latest submission. `Submitted` is observed as `Empty`
    /// plus this value; `SubmitFailed` as `Ready` plus a `Failed` outcome.
    pub fn last_submission(&self) -> Option<&SubmissionOutcome> {
        self.last_submission.as_ref()
    }

    pub fn draft(&self) -> RegistrationDraft {
        RegistrationDraft {
            person_ref: self.person.status.entity().cloned(),
            subject_ref: self.subject.status.entity().cloned(),
            enrollment_code: self.fields.enrollment_code.clone(),
            description: self.fields.description.clone(),
            credits: self.fields.credits.clone(),
        }
    }

    fn slot(&self, kind: EntityKind) -> &Dependency {
        match kind {
            EntityKind::Person => &self.person,
            EntityKind::Subject => &self.subject,
        }
    }

    fn slot_mut(&mut self, kind: EntityKind) -> &mut Dependency {
        match kind {
            EntityKind::Person => &mut self.person,
            EntityKind::Subject => &mut self.subject,
        }
    }

    fn reject_while_submitting(&self) -> Result<(), ClientError> {
        if self.submitting {
            Err(ClientError::Rejected(RejectReason::SubmissionInFlight))
        } else {
            Ok(())
        }
    }

    /// Changing a dependency key drops that dependency's resolution only.
    pub fn apply_edit(&mut self, edit: FieldEdit) -> Result<(), ClientError> {
        self.reject_while_submitting()?;
        match edit {
            FieldEdit::PersonKey(value) => self.person.set_input(value),
            FieldEdit::SubjectKey(value) => self.subject.set_input(value),
            FieldEdit::EnrollmentCode(value) => self.fields.enrollment_code = value,
            FieldEdit::Description(value) => self.fields.description = value,
            FieldEdit::Credits(value) => self.fields.credits = value,
        }
        self.validation_errors = None;
        Ok(())
    }

    /// Marks the slot pending; any earlier ticket for the same slot goes stale.
    pub fn begin_lookup(&mut self, kind: EntityKind) -> Result<LookupTicket, ClientError> {
        self.reject_while_submitting()?;
        let generation = self.generation;
        let slot = self.slot_mut(kind);
        let key = slot.input.trim();
        if key.is_empty() {
            return Err(ClientError::Validation(ValidationErrors::single(
                key_field(kind),
                format!("{kind} key is required"),
            )));
        }
        let key = ExternalKey(key.to_string());
        slot.seq += 1;
        slot.status = DependencyStatus::Pending { key: key.clone() };
        Ok(LookupTicket {
            kind,
            key,
            generation,
            seq: slot.seq,
        })
    }

    /// Returns `false` when the ticket is stale and the completion was dropped.
    pub fn complete_lookup(&mut self, ticket: &LookupTicket, completion: LookupCompletion) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        let slot = self.slot_mut(ticket.kind);
        if slot.seq != ticket.seq || !matches!(slot.status, DependencyStatus::Pending { .. }) {
            return false;
        }
        slot.status = match completion {
            LookupCompletion::Resolved(entity)
                if entity.resolved && entity.kind == ticket.kind =>
            {
                DependencyStatus::Resolved(entity)
            }
            LookupCompletion::Resolved(entity) => DependencyStatus::Failed {
                key: ticket.key.clone(),
                message: format!(
                    "lookup for {} returned an unresolved {} record",
                    ticket.kind, entity.kind
                ),
            },
            LookupCompletion::NotFound => DependencyStatus::NotFound {
                key: ticket.key.clone(),
            },
            LookupCompletion::Failed(message) => DependencyStatus::Failed {
                key: ticket.key.clone(),
                message,
            },
        };
        true
    }

    /// Validation runs here, before any request exists.
    pub fn begin_submit(&mut self) -> Result<SubmitTicket, ClientError> {
        self.reject_while_submitting()?;
        if self.state() != WorkflowState::Ready {
            return Err(ClientError::Rejected(RejectReason::NotReady));
        }
        let (person, subject) = match (self.person.status.entity(), self.subject.status.entity()) {
            (Some(person), Some(subject)) => (person, subject),
            _ => return Err(ClientError::Rejected(RejectReason::NotReady)),
        };
        let (codigo_matricula, descripcion, creditos) = match self.fields.validate() {
            Ok(valid) => valid,
            Err(errors) => {
                self.validation_errors = Some(errors.clone());
                return Err(ClientError::Validation(errors));
            }
        };
        let record = EnrollmentRecord {
            cedula: person.external_key.0.clone(),
            codigo_materia: subject.external_key.0.clone(),
            codigo_matricula,
            descripcion,
            creditos,
        };
        self.submitting = true;
        self.validation_errors = None;
        self.last_submission = None;
        Ok(SubmitTicket {
            record,
            generation: self.generation,
        })
    }

    /// Success resets the draft; failure returns to `Ready` with everything kept.
    pub fn complete_submit(
        &mut self,
        ticket: &SubmitTicket,
        result: Result<String, String>,
    ) -> Option<SubmissionOutcome> {
        if ticket.generation != self.generation || !self.submitting {
            return None;
        }
        self.submitting = false;
        let outcome = match result {
            Ok(message) => {
                self.clear_draft();
                SubmissionOutcome::Submitted { message }
            }
            Err(message) => SubmissionOutcome::Failed { message },
        };
        self.last_submission = Some(outcome.clone());
        Some(outcome)
    }

    /// Discards the draft and invalidates every outstanding lookup ticket.
    /// Rejected while a submission is in flight.
    pub fn reset(&mut self) -> Result<(), ClientError> {
        self.reject_while_submitting()?;
        self.clear_draft();
        Ok(())
    }

    /// Tears the workflow down regardless of an in-flight submission; the
    /// caller must stop issuing submissions afterwards.
    pub(crate) fn abandon(&mut self) {
        self.clear_draft();
    }

    fn clear_draft(&mut self) {
        *self = Self {
            generation: self.generation + 1,
            ..Self::default()
        };
    }
}

#[cfg(test)]
#[path = "../tests/workflow_tests.rs"]
mod tests;
