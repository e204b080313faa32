//! Domain layer - Pure business rules
//!
//! This layer contains NO framework dependencies (no Axum, and from SeaORM
//! only the entity models). Error taxonomy, lending eligibility rules and
//! the audit context live here.

pub mod eligibility;
pub mod errors;

pub use eligibility::check_lendable;
pub use errors::DomainError;

/// Identity of the actor performing a mutation, threaded into every write
/// so `created_by`/`updated_by` record the real caller instead of a
/// hardcoded system account.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub actor: String,
}

impl AuditContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }
}
