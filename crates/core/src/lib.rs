pub mod approvals;
pub mod audit;
pub mod config;
pub mod display;
pub mod distribution;
pub mod domain;
pub mod errors;
pub mod sla;

pub use approvals::engine::{
    ApprovalDecision, ApprovalEngine, ApprovalError, ApprovalProgress, ApprovalTransition,
};
pub use approvals::{
    ApprovalValidationFailure, ApprovalValidationInput, ApprovalValidationResult,
    ApprovalValidator, ApproverAuthority, WorkflowCatalog,
};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use display::{Badge, BadgeTone};
pub use distribution::{
    allocate, Allocation, AllocationError, DistributionOutcome, DistributionPlan,
    DistributionShare,
};
pub use domain::approval::{
    ApprovalId, ApprovalLevel, ApprovalState, ApprovalStatus, ApprovalStep, ApprovalStepId,
    ApprovalWorkflow, EntityType, StepAction, WorkflowConditions, WorkflowId,
};
pub use domain::beneficiary::{Beneficiary, BeneficiaryId};
pub use domain::journal::{JournalEntry, JournalEntryId, JournalLine, JournalStatus};
pub use domain::request::{
    BeneficiaryRequest, Priority, RequestId, RequestIntake, RequestKind, RequestStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use sla::{Clock, FixedClock, SlaAssessment, SlaClass, SlaPolicy, SlaTargets, SystemClock};
