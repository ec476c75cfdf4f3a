use anyhow::{anyhow, bail};
use clap::Args;
use client_core::{
    ApiGateway, AuthGate, ClientError, FieldEdit, LookupReport, RegistrationController,
    SubmitReport, LOGIN_ROUTE,
};
use shared::domain::{EntityKind, ResolvedEntity};
use tracing::{info, warn};

const CEDULA_LEN: usize = 10;

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// National id of the student (10 digits).
    #[arg(long)]
    pub cedula: String,
    /// Subject code.
    #[arg(long)]
    pub materia: String,
    /// Enrollment code for the new record.
    #[arg(long)]
    pub matricula: String,
    #[arg(long)]
    pub descripcion: String,
    #[arg(long, allow_hyphen_values = true)]
    pub creditos: String,
}

pub fn validate_cedula(raw: &str) -> anyhow::Result<&str> {
    let cedula = raw.trim();
    if cedula.len() != CEDULA_LEN || !cedula.chars().all(|c| c.is_ascii_digit()) {
        bail!("cedula must be exactly {CEDULA_LEN} digits, got '{cedula}'");
    }
    Ok(cedula)
}

pub fn describe(entity: &ResolvedEntity) -> String {
    let fields = entity
        .display_fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {} [{fields}]", entity.kind, entity.external_key)
}

/// Returns the backend's confirmation message.
pub async fn run(
    gate: &mut AuthGate,
    gateway: &ApiGateway,
    args: &RegisterArgs,
) -> anyhow::Result<String> {
    let Some(token) = gate.guard(|token| token).rendered() else {
        bail!("not authenticated: redirected to {LOGIN_ROUTE}; run `console login` first");
    };
    let cedula = validate_cedula(&args.cedula)?;

    let controller = RegistrationController::over_http(gateway.authorized(token));
    for edit in [
        FieldEdit::EnrollmentCode(args.matricula.clone()),
        FieldEdit::Description(args.descripcion.clone()),
        FieldEdit::Credits(args.creditos.clone()),
    ] {
        controller.edit(edit)?;
    }

    let (person, subject) = tokio::join!(
        controller.lookup(EntityKind::Person, cedula),
        controller.lookup(EntityKind::Subject, args.materia.as_str()),
    );

    let mut missing = Vec::new();
    for (kind, report) in [(EntityKind::Person, person), (EntityKind::Subject, subject)] {
        match report {
            Ok(LookupReport::Resolved(entity)) => println!("found {}", describe(&entity)),
            Ok(LookupReport::NotFound) => {
                println!("{kind} not found");
                missing.push(kind);
            }
            Ok(LookupReport::Discarded) => missing.push(kind),
            Err(err) => return Err(escalate(gate, err).await),
        }
    }
    if !missing.is_empty() {
        let kinds = missing
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("cannot register: unresolved {kinds}");
    }

    match controller.submit().await {
        Ok(SubmitReport::Submitted { message }) => {
            info!(cedula, materia = %args.materia, "console: enrollment registered");
            Ok(message)
        }
        Ok(SubmitReport::Discarded) => Err(anyhow!("submission result was discarded")),
        Err(err) => Err(escalate(gate, err).await),
    }
}

/// Authorization failures drop the stored session before surfacing the error.
async fn escalate(gate: &mut AuthGate, err: ClientError) -> anyhow::Error {
    warn!(code = ?err.code(), error = %err, "console: registration step failed");
    match gate.report_failure(&err).await {
        Ok(true) => anyhow::Error::new(err)
            .context(format!("session expired; log in again at {LOGIN_ROUTE}")),
        Ok(false) => anyhow::Error::new(err),
        Err(storage) => anyhow::Error::new(storage).context("failed to clear rejected session"),
    }
}

#[cfg(test)]
#[path = "tests/register_tests.rs"]
mod tests;
