pub mod controller;
pub mod workflow;

pub use controller::{
    EnrollmentSubmitter, HttpEnrollmentSubmitter, LookupReport, RegistrationController,
    SubmitReport, SUBMIT_PATH,
};
pub use workflow::{
    DependencyState, DependencyStatus, DraftFields, FieldEdit, LookupCompletion, LookupTicket,
    RegistrationDraft, RegistrationWorkflow, SubmissionOutcome, SubmitTicket, WorkflowState,
};
