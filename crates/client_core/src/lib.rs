pub mod error;
pub mod gate;
pub mod gateway;
pub mod registration;
pub mod resolver;
pub mod session;

pub use error::{ClientError, FieldError, RejectReason, ValidationErrors};
pub use gate::{
    classify_route, AuthGate, GateDecision, Guarded, LoginCredentials, RouteAccess,
    LANDING_ROUTE, LOGIN_ROUTE,
};
pub use gateway::{ApiGateway, AuthorizedGateway, GatewayConfig};
pub use registration::{
    DependencyState, DependencyStatus, EnrollmentSubmitter, FieldEdit, HttpEnrollmentSubmitter,
    LookupReport, RegistrationController, RegistrationWorkflow, SubmitReport, WorkflowState,
};
pub use resolver::{EntityResolver, HttpEntityResolver, Resolution};
pub use session::{AuthStatus, CredentialStore, MemoryCredentialStore, SessionStore, TOKEN_KEY};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
