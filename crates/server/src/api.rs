//! JSON API for the waqf administration portal.
//!
//! Endpoints:
//! - `GET  /api/v1/requests?status=&overdue=&limit=`  requests with derived SLA and badges
//! - `POST /api/v1/requests`                          open a request; loans and aid start an approval
//! - `POST /api/v1/requests/{id}/status`              move a request along its lifecycle
//! - `POST /api/v1/approvals`                         submit an entity for approval
//! - `GET  /api/v1/approvals/pending?role=&limit=`    approvals waiting on a role
//! - `GET  /api/v1/approvals/{id}`                    status, steps and progress
//! - `POST /api/v1/approvals/{id}/decision`           action the current level
//! - `POST /api/v1/distributions/preview`             allocate a yield across shares
//! - `GET  /reports/requests?status=`                 HTML SLA report
//!
//! Mutating routes require `Authorization: Bearer <token>` when
//! `server.api_token` is configured.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use waqf_core::approvals::engine::{ApprovalDecision, ApprovalEngine, ApprovalProgress};
use waqf_core::approvals::WorkflowCatalog;
use waqf_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
use waqf_core::config::{AppConfig, ServerConfig};
use waqf_core::display::{
    approval_state_badge, priority_badge, request_status_badge, sla_badge, Badge,
};
use waqf_core::domain::approval::{
    ApprovalId, ApprovalState, ApprovalStatus, ApprovalStep, EntityType, StepAction,
};
use waqf_core::distribution::{allocate, DistributionOutcome, DistributionPlan, DistributionShare};
use waqf_core::domain::beneficiary::BeneficiaryId;
use waqf_core::domain::journal::JournalEntry;
use waqf_core::domain::request::{
    BeneficiaryRequest, Priority, RequestId, RequestIntake, RequestKind, RequestStatus,
};
use waqf_core::errors::{ApplicationError, DomainError, InterfaceError};
use waqf_core::sla::{Clock, SlaAssessment, SlaPolicy, SystemClock};
use waqf_db::repositories::{
    ApprovalRepository, AuditEventRepository, BeneficiaryRepository, PendingApproval,
    RepositoryError, RequestFilter, RequestRepository, SqlApprovalRepository, SqlAuditEventRepository,
    SqlBeneficiaryRepository, SqlRequestRepository, SqlWorkflowRepository, WorkflowRepository,
};
use waqf_db::DbPool;

use crate::report::{self, ReportRenderer};

const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 500;
const CORRELATION_HEADER: &str = "x-correlation-id";
const REQUEST_ENTITY: &str = "beneficiary_request";

#[derive(Clone)]
pub struct ApiState {
    pub(crate) workflows: Arc<dyn WorkflowRepository>,
    pub(crate) approvals: Arc<dyn ApprovalRepository>,
    pub(crate) requests: Arc<dyn RequestRepository>,
    pub(crate) beneficiaries: Arc<dyn BeneficiaryRepository>,
    pub(crate) audit: Arc<dyn AuditEventRepository>,
    pub(crate) engine: ApprovalEngine,
    pub(crate) sla: SlaPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) reports: Arc<ReportRenderer>,
    pub(crate) server: Arc<ServerConfig>,
}

impl ApiState {
    pub fn sql(pool: DbPool, config: &AppConfig) -> Self {
        Self {
            workflows: Arc::new(SqlWorkflowRepository::new(pool.clone())),
            approvals: Arc::new(SqlApprovalRepository::new(pool.clone())),
            requests: Arc::new(SqlRequestRepository::new(pool.clone())),
            beneficiaries: Arc::new(SqlBeneficiaryRepository::new(pool.clone())),
            audit: Arc::new(SqlAuditEventRepository::new(pool)),
            engine: ApprovalEngine::default(),
            sla: SlaPolicy::from_config(&config.sla),
            clock: Arc::new(SystemClock),
            reports: Arc::new(load_reports()),
            server: Arc::new(config.server.clone()),
        }
    }
}

fn load_reports() -> ReportRenderer {
    match ReportRenderer::embedded() {
        Ok(renderer) => renderer,
        Err(error) => {
            warn!(
                event_name = "system.reports.template_error",
                correlation_id = "bootstrap",
                error = %error,
                "report templates failed to load; report routes will return 500"
            );
            ReportRenderer::unavailable()
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/requests", get(list_requests).post(open_request))
        .route("/api/v1/requests/{id}/status", post(change_request_status))
        .route("/api/v1/approvals", post(submit_approval))
        .route("/api/v1/approvals/pending", get(list_pending_approvals))
        .route("/api/v1/approvals/{id}", get(get_approval))
        .route("/api/v1/approvals/{id}/decision", post(decide_approval))
        .route("/api/v1/distributions/preview", post(preview_distribution))
        .route("/reports/requests", get(report::requests_report))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    /// Localized text for the portal notification.
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

pub type ApiError = (StatusCode, Json<ApiErrorBody>);

fn interface_error(error: InterfaceError) -> ApiError {
    let (status, code) = match &error {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    // Server-side failures keep their detail in the logs only.
    let message = if status.is_server_error() {
        error.user_message().to_string()
    } else {
        error.message().to_string()
    };

    (
        status,
        Json(ApiErrorBody {
            code,
            error: error.user_message().to_string(),
            message,
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

pub(crate) fn application_error(error: ApplicationError, correlation_id: &str) -> ApiError {
    match &error {
        ApplicationError::Persistence(_) | ApplicationError::Configuration(_) => error!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %error,
            "request failed"
        ),
        _ => info!(
            event_name = "api.request.refused",
            correlation_id = %correlation_id,
            error = %error,
            "request refused"
        ),
    }
    interface_error(error.into_interface(correlation_id))
}

pub(crate) fn repository_error(error: RepositoryError, correlation_id: &str) -> ApiError {
    application_error(ApplicationError::from(error), correlation_id)
}

pub(crate) fn internal_error(message: String, correlation_id: &str) -> ApiError {
    error!(
        event_name = "api.request.failed",
        correlation_id = %correlation_id,
        error = %message,
        "request failed"
    );
    interface_error(InterfaceError::Internal { message, correlation_id: correlation_id.to_string() })
}

fn bad_request(error: DomainError, correlation_id: &str) -> ApiError {
    application_error(ApplicationError::Domain(error), correlation_id)
}

fn unauthorized(correlation_id: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorBody {
            code: "unauthorized",
            error: "يلزم رمز وصول صالح لتنفيذ هذا الإجراء.".to_string(),
            message: "missing or invalid bearer token".to_string(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Caller-supplied `x-correlation-id`, or a fresh one.
pub(crate) fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", &Uuid::new_v4().simple().to_string()[..12]))
}

fn authorize(state: &ApiState, headers: &HeaderMap, correlation_id: &str) -> Result<(), ApiError> {
    if !state.server.requires_token() {
        return Ok(());
    }

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if state.server.token_matches(token) => Ok(()),
        _ => {
            warn!(
                event_name = "api.auth.rejected",
                correlation_id = %correlation_id,
                "bearer token missing or invalid"
            );
            Err(unauthorized(correlation_id))
        }
    }
}

pub(crate) fn parse_status_filter(
    raw: Option<&str>,
    correlation_id: &str,
) -> Result<Option<RequestStatus>, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => RequestStatus::from_str(value)
            .map(Some)
            .map_err(|error| bad_request(error, correlation_id)),
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Writes drained audit events. Failures are logged and never fail the request.
async fn persist_audit(state: &ApiState, sink: &InMemoryAuditSink) {
    for event in sink.drain() {
        let event_type = event.event_type.clone();
        let correlation_id = event.correlation_id.clone();
        if let Err(error) = state.audit.append(event).await {
            error!(
                event_name = "api.audit.write_failed",
                correlation_id = %correlation_id,
                audit_event_type = %event_type,
                error = %error,
                "failed to persist audit event"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub overdue: Option<bool>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RequestBadges {
    pub status: Badge,
    pub priority: Badge,
    pub sla: Badge,
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: BeneficiaryRequest,
    pub sla: SlaAssessment,
    pub badges: RequestBadges,
}

impl RequestView {
    fn assess(request: BeneficiaryRequest, policy: &SlaPolicy, clock: &dyn Clock) -> Self {
        let sla = policy.assess_status(request.sla_due_at, request.status, clock.now());
        let badges = RequestBadges {
            status: request_status_badge(request.status),
            priority: priority_badge(request.priority),
            sla: sla_badge(sla.class),
        };
        Self { request, sla, badges }
    }
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let status = parse_status_filter(query.status.as_deref(), &correlation_id)?;

    // Filtered in the query so `limit` counts only matching rows.
    let filter = if query.overdue.unwrap_or(false) {
        RequestFilter { status, open_only: true, overdue_at: Some(state.clock.now()) }
    } else {
        RequestFilter::with_status(status)
    };

    let requests = state
        .requests
        .list(&filter, clamp_limit(query.limit))
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    let views: Vec<RequestView> = requests
        .into_iter()
        .map(|request| RequestView::assess(request, &state.sla, state.clock.as_ref()))
        .collect();

    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct OpenRequestBody {
    pub beneficiary_id: String,
    pub kind: String,
    pub title: String,
    pub amount: Option<Decimal>,
    pub priority: String,
    pub submitted_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenRequestResponse {
    #[serde(flatten)]
    pub request: RequestView,
    /// Approval run started for loan and emergency-aid requests, when a workflow matches.
    pub approval: Option<ApprovalView>,
}

async fn open_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<OpenRequestBody>,
) -> Result<(StatusCode, Json<OpenRequestResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;

    let kind = RequestKind::from_str(&body.kind).map_err(|e| bad_request(e, &correlation_id))?;
    let priority =
        Priority::from_str(&body.priority).map_err(|e| bad_request(e, &correlation_id))?;
    let beneficiary_id = BeneficiaryId(body.beneficiary_id.trim().to_string());
    ensure_active_beneficiary(&state, &beneficiary_id, &correlation_id).await?;

    let mut request = RequestIntake {
        beneficiary_id,
        kind,
        title: body.title,
        amount: body.amount,
        priority,
    }
    .open(&state.sla, state.clock.now())
    .map_err(|error| bad_request(error, &correlation_id))?;

    state
        .requests
        .save(request.clone())
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    let actor = body.submitted_by.unwrap_or_else(|| "portal".to_string());
    let sink = InMemoryAuditSink::default();
    sink.emit(
        AuditEvent::new(
            &AuditContext::new(&correlation_id, actor.clone()),
            "request.opened",
            AuditCategory::Intake,
            AuditOutcome::Success,
        )
        .for_entity(REQUEST_ENTITY, request.id.0.clone())
        .with_metadata("priority", request.priority.as_str())
        .with_metadata("kind", request.kind.as_str()),
    );
    persist_audit(&state, &sink).await;

    info!(
        event_name = "api.request.opened",
        correlation_id = %correlation_id,
        request_id = %request.id.0,
        priority = request.priority.as_str(),
        "beneficiary request opened"
    );

    let mut approval = None;
    if let (Some(entity_type), Some(amount)) = (request.kind.entity_type(), request.amount) {
        if let Some((status, steps)) =
            start_approval(&state, entity_type, &request.id.0, amount, actor, &correlation_id)
                .await?
        {
            request
                .transition_to(RequestStatus::UnderReview, state.clock.now())
                .map_err(|error| bad_request(error, &correlation_id))?;
            state
                .requests
                .save(request.clone())
                .await
                .map_err(|error| repository_error(error, &correlation_id))?;
            approval = Some(ApprovalView::new(status, steps));
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(OpenRequestResponse {
            request: RequestView::assess(request, &state.sla, state.clock.as_ref()),
            approval,
        }),
    ))
}

async fn ensure_active_beneficiary(
    state: &ApiState,
    beneficiary_id: &BeneficiaryId,
    correlation_id: &str,
) -> Result<(), ApiError> {
    let beneficiary = state
        .beneficiaries
        .find_by_id(beneficiary_id)
        .await
        .map_err(|error| repository_error(error, correlation_id))?
        .ok_or_else(|| {
            application_error(
                ApplicationError::NotFound(format!("beneficiary `{}`", beneficiary_id.0)),
                correlation_id,
            )
        })?;
    if !beneficiary.active {
        return Err(bad_request(
            DomainError::InvariantViolation(format!(
                "beneficiary `{}` is inactive",
                beneficiary_id.0
            )),
            correlation_id,
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RequestStatusBody {
    pub status: String,
    pub changed_by: Option<String>,
}

async fn change_request_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RequestStatusBody>,
) -> Result<Json<RequestView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;

    let next =
        RequestStatus::from_str(&body.status).map_err(|e| bad_request(e, &correlation_id))?;
    let request_id = RequestId(id);
    let mut request = state
        .requests
        .find_by_id(&request_id)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?
        .ok_or_else(|| {
            application_error(
                ApplicationError::NotFound(format!("request `{}`", request_id.0)),
                &correlation_id,
            )
        })?;

    // Decisions on routed requests come from their approval run.
    if matches!(next, RequestStatus::Approved | RequestStatus::Rejected) {
        if let Some(entity_type) = request.kind.entity_type() {
            let runs = state
                .approvals
                .find_for_entity(entity_type, &request.id.0)
                .await
                .map_err(|error| repository_error(error, &correlation_id))?;
            if let Some(open) = runs.iter().find(|run| run.status == ApprovalState::Pending) {
                return Err(application_error(
                    ApplicationError::Conflict(format!(
                        "request `{}` is decided by pending approval `{}`",
                        request.id.0, open.id.0
                    )),
                    &correlation_id,
                ));
            }
        }
    }

    let from = request.status;
    request.transition_to(next, state.clock.now()).map_err(|error| {
        application_error(ApplicationError::Conflict(error.to_string()), &correlation_id)
    })?;
    state
        .requests
        .save(request.clone())
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    let sink = InMemoryAuditSink::default();
    sink.emit(
        AuditEvent::new(
            &AuditContext::new(
                &correlation_id,
                body.changed_by.unwrap_or_else(|| "portal".to_string()),
            ),
            "request.status_changed",
            AuditCategory::Intake,
            AuditOutcome::Success,
        )
        .for_entity(REQUEST_ENTITY, request.id.0.clone())
        .with_metadata("from", from.as_str())
        .with_metadata("to", next.as_str()),
    );
    persist_audit(&state, &sink).await;

    info!(
        event_name = "api.request.status_changed",
        correlation_id = %correlation_id,
        request_id = %request.id.0,
        from = from.as_str(),
        to = next.as_str(),
        "request status changed"
    );

    Ok(Json(RequestView::assess(request, &state.sla, state.clock.as_ref())))
}

/// Mirrors a finished approval run onto the request it was started for.
/// The decision has already landed, so failures here are logged only.
async fn settle_routed_request(
    state: &ApiState,
    status: &ApprovalStatus,
    correlation_id: &str,
    audit: &AuditContext,
) {
    let next = match status.status {
        ApprovalState::Approved => RequestStatus::Approved,
        ApprovalState::Rejected => RequestStatus::Rejected,
        ApprovalState::Pending => return,
    };
    if !matches!(status.entity_type, EntityType::Loan | EntityType::EmergencyAid) {
        return;
    }

    let request_id = RequestId(status.entity_id.clone());
    let mut request = match state.requests.find_by_id(&request_id).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(error) => {
            error!(
                event_name = "api.request.settle_failed",
                correlation_id = %correlation_id,
                request_id = %request_id.0,
                error = %error,
                "failed to load request for finished approval"
            );
            return;
        }
    };

    let from = request.status;
    if let Err(error) = request.transition_to(next, state.clock.now()) {
        warn!(
            event_name = "api.request.settle_skipped",
            correlation_id = %correlation_id,
            request_id = %request_id.0,
            error = %error,
            "request no longer accepts the approval outcome"
        );
        return;
    }
    if let Err(error) = state.requests.save(request).await {
        error!(
            event_name = "api.request.settle_failed",
            correlation_id = %correlation_id,
            request_id = %request_id.0,
            error = %error,
            "failed to store approval outcome on request"
        );
        return;
    }

    let sink = InMemoryAuditSink::default();
    sink.emit(
        AuditEvent::new(audit, "request.status_changed", AuditCategory::Intake, AuditOutcome::Success)
            .for_entity(REQUEST_ENTITY, request_id.0.clone())
            .with_metadata("from", from.as_str())
            .with_metadata("to", next.as_str())
            .with_metadata("approval_id", status.id.0.clone()),
    );
    persist_audit(state, &sink).await;
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApprovalView {
    #[serde(flatten)]
    pub status: ApprovalStatus,
    pub badge: Badge,
    pub steps: Vec<ApprovalStep>,
    pub progress: ApprovalProgress,
}

impl ApprovalView {
    fn new(status: ApprovalStatus, mut steps: Vec<ApprovalStep>) -> Self {
        steps.sort_by_key(|step| step.level);
        let progress = ApprovalProgress::of(&status, &steps);
        Self { badge: approval_state_badge(status.status), status, steps, progress }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitApprovalBody {
    pub entity_type: String,
    pub entity_id: String,
    /// Required for every type except journal entries, whose amount is their balanced total.
    pub amount: Option<Decimal>,
    pub journal_entry: Option<JournalEntry>,
    pub submitted_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitApprovalResponse {
    pub approval_required: bool,
    pub approval: Option<ApprovalView>,
}

async fn submit_approval(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubmitApprovalBody>,
) -> Result<(StatusCode, Json<SubmitApprovalResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;

    let entity_type =
        EntityType::from_str(&body.entity_type).map_err(|e| bad_request(e, &correlation_id))?;
    let entity_id = body.entity_id.trim().to_string();
    let amount = approval_amount(entity_type, body.amount, body.journal_entry.as_ref())
        .map_err(|error| bad_request(error, &correlation_id))?;

    let actor = body.submitted_by.unwrap_or_else(|| "portal".to_string());
    let started =
        start_approval(&state, entity_type, &entity_id, amount, actor, &correlation_id).await?;

    Ok(match started {
        Some((status, steps)) => (
            StatusCode::CREATED,
            Json(SubmitApprovalResponse {
                approval_required: true,
                approval: Some(ApprovalView::new(status, steps)),
            }),
        ),
        None => (
            StatusCode::OK,
            Json(SubmitApprovalResponse { approval_required: false, approval: None }),
        ),
    })
}

/// Journal entries are routed on their balanced debit total; every other
/// type needs an explicit amount.
fn approval_amount(
    entity_type: EntityType,
    amount: Option<Decimal>,
    journal_entry: Option<&JournalEntry>,
) -> Result<Decimal, DomainError> {
    match (entity_type, journal_entry) {
        (EntityType::JournalEntry, Some(entry)) => {
            let total = entry.validate_balanced()?;
            match amount {
                Some(stated) if stated != total => Err(DomainError::InvariantViolation(format!(
                    "stated amount {stated} does not match journal debit total {total}"
                ))),
                _ => Ok(total),
            }
        }
        (EntityType::JournalEntry, None) => Err(DomainError::InvariantViolation(
            "journal_entry submissions must include the entry lines".to_string(),
        )),
        (_, Some(_)) => Err(DomainError::InvariantViolation(format!(
            "journal lines are only accepted for journal_entry, not {}",
            entity_type.as_str()
        ))),
        (_, None) => amount.ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "{} submissions must state an amount",
                entity_type.as_str()
            ))
        }),
    }
}

/// Selects the workflow for `entity_type`/`amount` and persists a new run.
/// `Ok(None)` means no active workflow requires approval.
async fn start_approval(
    state: &ApiState,
    entity_type: EntityType,
    entity_id: &str,
    amount: Decimal,
    actor: String,
    correlation_id: &str,
) -> Result<Option<(ApprovalStatus, Vec<ApprovalStep>)>, ApiError> {
    let existing = state
        .approvals
        .find_for_entity(entity_type, entity_id)
        .await
        .map_err(|error| repository_error(error, correlation_id))?;
    if let Some(open) = existing.iter().find(|status| status.status == ApprovalState::Pending) {
        return Err(application_error(
            ApplicationError::Conflict(format!(
                "{} `{entity_id}` already has pending approval `{}`",
                entity_type.as_str(),
                open.id.0
            )),
            correlation_id,
        ));
    }

    let workflows = state
        .workflows
        .list_active(Some(entity_type))
        .await
        .map_err(|error| repository_error(error, correlation_id))?;
    let catalog = WorkflowCatalog::new(workflows);
    let Some(workflow) = catalog.select(entity_type, amount) else {
        info!(
            event_name = "api.approval.not_required",
            correlation_id = %correlation_id,
            entity_type = entity_type.as_str(),
            entity_id = %entity_id,
            "no active workflow matches; approval not required"
        );
        return Ok(None);
    };

    let audit = AuditContext::new(correlation_id, actor);
    let sink = InMemoryAuditSink::default();
    let started =
        state.engine.start_with_audit(workflow, entity_id, amount, state.clock.now(), &sink, &audit);

    let (status, steps) = match started {
        Ok(started) => started,
        Err(error) => {
            persist_audit(state, &sink).await;
            return Err(application_error(error.into(), correlation_id));
        }
    };

    if let Err(error) = state.approvals.save_started(status.clone(), steps.clone()).await {
        sink.drain();
        return Err(repository_error(error, correlation_id));
    }
    persist_audit(state, &sink).await;

    info!(
        event_name = "api.approval.started",
        correlation_id = %correlation_id,
        approval_id = %status.id.0,
        workflow_id = %workflow.id.0,
        entity_id = %status.entity_id,
        total_levels = status.total_levels,
        "approval started"
    );

    Ok(Some((status, steps)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    pub role: Option<String>,
    pub limit: Option<u32>,
}

async fn list_pending_approvals(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<PendingApproval>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let role = query.role.as_deref().map(str::trim).filter(|role| !role.is_empty());

    let pending = state
        .approvals
        .list_pending(role, clamp_limit(query.limit))
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    Ok(Json(pending))
}

async fn load_approval(
    state: &ApiState,
    id: &ApprovalId,
    correlation_id: &str,
) -> Result<(ApprovalStatus, Vec<ApprovalStep>), ApiError> {
    let status = state
        .approvals
        .find_by_id(id)
        .await
        .map_err(|error| repository_error(error, correlation_id))?
        .ok_or_else(|| {
            application_error(
                ApplicationError::NotFound(format!("approval `{}`", id.0)),
                correlation_id,
            )
        })?;
    let steps =
        state.approvals.steps_for(id).await.map_err(|error| repository_error(error, correlation_id))?;
    Ok((status, steps))
}

async fn get_approval(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApprovalView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let (status, steps) = load_approval(&state, &ApprovalId(id), &correlation_id).await?;
    Ok(Json(ApprovalView::new(status, steps)))
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub level: u32,
    pub approver_name: String,
    pub approver_role: String,
    pub action: String,
    pub notes: Option<String>,
}

async fn decide_approval(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<ApprovalView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;

    let action = StepAction::from_str(&body.action).map_err(|e| bad_request(e, &correlation_id))?;
    let approval_id = ApprovalId(id);
    let (status, steps) = load_approval(&state, &approval_id, &correlation_id).await?;

    let decision = ApprovalDecision {
        level: body.level,
        approver_name: body.approver_name,
        approver_role: body.approver_role,
        action,
        notes: body.notes,
    };
    let audit = AuditContext::new(
        &correlation_id,
        format!("{}:{}", decision.approver_role.trim(), decision.approver_name.trim()),
    );
    let sink = InMemoryAuditSink::default();

    let transition = match state.engine.act_with_audit(
        &status,
        &steps,
        &decision,
        state.clock.now(),
        &sink,
        &audit,
    ) {
        Ok(transition) => transition,
        Err(error) => {
            persist_audit(&state, &sink).await;
            return Err(application_error(error.into(), &correlation_id));
        }
    };

    if let Err(error) = state.approvals.record_transition(&transition).await {
        // The engine's events describe a transition that never landed.
        sink.drain();
        if matches!(error, RepositoryError::Conflict(_)) {
            sink.emit(
                AuditEvent::new(
                    &audit,
                    "approval.transition_conflict",
                    AuditCategory::Approval,
                    AuditOutcome::Rejected,
                )
                .for_entity(status.entity_type.as_str(), status.entity_id.clone())
                .with_metadata("approval_id", approval_id.0.clone())
                .with_metadata("level", decision.level.to_string()),
            );
            persist_audit(&state, &sink).await;
        }
        return Err(repository_error(error, &correlation_id));
    }
    persist_audit(&state, &sink).await;
    settle_routed_request(&state, &transition.status, &correlation_id, &audit).await;

    info!(
        event_name = "api.approval.decided",
        correlation_id = %correlation_id,
        approval_id = %approval_id.0,
        level = decision.level,
        action = action.as_str(),
        to_state = transition.to_state.as_str(),
        to_level = transition.to_level,
        "approval decision recorded"
    );

    let steps = state
        .approvals
        .steps_for(&approval_id)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;
    Ok(Json(ApprovalView::new(transition.status, steps)))
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DistributionPreviewBody {
    pub gross: Decimal,
    #[serde(default)]
    pub nazer_fee_pct: Decimal,
    #[serde(default)]
    pub reserve_pct: Decimal,
    pub shares: Vec<DistributionShare>,
}

async fn preview_distribution(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DistributionPreviewBody>,
) -> Result<Json<DistributionOutcome>, ApiError> {
    let correlation_id = correlation_id(&headers);

    for share in &body.shares {
        ensure_active_beneficiary(&state, &share.beneficiary_id, &correlation_id).await?;
    }

    let plan = DistributionPlan {
        gross: body.gross,
        nazer_fee_pct: body.nazer_fee_pct,
        reserve_pct: body.reserve_pct,
    };
    let outcome = allocate(&plan, &body.shares).map_err(|error| {
        bad_request(DomainError::InvariantViolation(error.to_string()), &correlation_id)
    })?;

    info!(
        event_name = "api.distribution.previewed",
        correlation_id = %correlation_id,
        shares = outcome.allocations.len(),
        net = %outcome.net,
        "distribution allocation previewed"
    );

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use waqf_core::approvals::engine::ApprovalEngine;
    use waqf_core::config::ServerConfig;
    use waqf_core::domain::approval::{
        ApprovalLevel, ApprovalWorkflow, EntityType, WorkflowConditions, WorkflowId,
    };
    use waqf_core::domain::beneficiary::{Beneficiary, BeneficiaryId};
    use waqf_core::domain::request::{
        BeneficiaryRequest, Priority, RequestId, RequestKind, RequestStatus,
    };
    use waqf_core::sla::{FixedClock, SlaPolicy};
    use waqf_db::repositories::{
        AuditEventRepository, BeneficiaryRepository, InMemoryApprovalRepository,
        InMemoryAuditEventRepository, InMemoryBeneficiaryRepository, InMemoryRequestRepository,
        InMemoryWorkflowRepository, WorkflowRepository,
    };

    use super::{router, ApiState};
    use crate::report::ReportRenderer;

    const TOKEN: &str = "test-token-0123456789abcdef";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).single().expect("time")
    }

    struct Harness {
        state: ApiState,
        audit: Arc<InMemoryAuditEventRepository>,
    }

    async fn harness(api_token: Option<&str>) -> Harness {
        let workflows = Arc::new(InMemoryWorkflowRepository::default());
        workflows
            .save(ApprovalWorkflow {
                id: WorkflowId("WF-PAY".to_string()),
                name: "اعتماد المدفوعات".to_string(),
                entity_type: EntityType::Payment,
                levels: vec![
                    ApprovalLevel { level: 1, approver_role: "accountant".to_string(), required: false },
                    ApprovalLevel {
                        level: 2,
                        approver_role: "financial_manager".to_string(),
                        required: true,
                    },
                ],
                conditions: WorkflowConditions {
                    min_amount: Some(Decimal::new(1_000, 0)),
                    max_amount: None,
                },
                active: true,
                created_at: now(),
            })
            .await
            .expect("workflow");
        workflows
            .save(ApprovalWorkflow {
                id: WorkflowId("WF-AID".to_string()),
                name: "الإعانات الطارئة الكبيرة".to_string(),
                entity_type: EntityType::EmergencyAid,
                levels: vec![ApprovalLevel { level: 1, approver_role: "nazer".to_string(), required: true }],
                conditions: WorkflowConditions {
                    min_amount: Some(Decimal::new(5_000, 0)),
                    max_amount: None,
                },
                active: true,
                created_at: now(),
            })
            .await
            .expect("aid workflow");
        workflows
            .save(ApprovalWorkflow {
                id: WorkflowId("WF-JRN".to_string()),
                name: "اعتماد القيود".to_string(),
                entity_type: EntityType::JournalEntry,
                levels: vec![ApprovalLevel {
                    level: 1,
                    approver_role: "accountant".to_string(),
                    required: true,
                }],
                conditions: WorkflowConditions::default(),
                active: true,
                created_at: now(),
            })
            .await
            .expect("journal workflow");

        let beneficiaries = Arc::new(InMemoryBeneficiaryRepository::default());
        for (index, (id, active)) in [("BEN-1", true), ("BEN-2", true), ("BEN-OLD", false)].into_iter().enumerate() {
            beneficiaries
                .save(Beneficiary {
                    id: BeneficiaryId(id.to_string()),
                    full_name: "نورة الدوسري".to_string(),
                    national_id: format!("100000000{index}"),
                    category: "أرملة".to_string(),
                    phone: None,
                    active,
                    created_at: now(),
                })
                .await
                .expect("beneficiary");
        }

        let audit = Arc::new(InMemoryAuditEventRepository::default());
        let state = ApiState {
            workflows,
            approvals: Arc::new(InMemoryApprovalRepository::default()),
            requests: Arc::new(InMemoryRequestRepository::default()),
            beneficiaries,
            audit: audit.clone(),
            engine: ApprovalEngine::default(),
            sla: SlaPolicy::default(),
            clock: Arc::new(FixedClock(now())),
            reports: Arc::new(ReportRenderer::embedded().expect("templates")),
            server: Arc::new(ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 5,
                api_token: api_token.map(|token| SecretString::from(token.to_string())),
            }),
        };
        Harness { state, audit }
    }

    async fn call(state: &ApiState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        call_with_token(state, method, uri, body, None).await
    }

    async fn call_with_token(
        state: &ApiState,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-correlation-id", "corr-test");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = router(state.clone()).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn decision(level: u32, role: &str, action: &str, notes: Option<&str>) -> Value {
        json!({
            "level": level,
            "approver_name": "أحمد",
            "approver_role": role,
            "action": action,
            "notes": notes,
        })
    }

    async fn start_payment(state: &ApiState, entity_id: &str, amount: &str) -> (StatusCode, Value) {
        call(
            state,
            "POST",
            "/api/v1/approvals",
            Some(json!({ "entity_type": "payment", "entity_id": entity_id, "amount": amount })),
        )
        .await
    }

    #[tokio::test]
    async fn open_request_assigns_deadline_and_lists_with_sla() {
        let harness = harness(None).await;

        let (status, created) = call(
            &harness.state,
            "POST",
            "/api/v1/requests",
            Some(json!({
                "beneficiary_id": "BEN-1",
                "kind": "emergency_aid",
                "title": "  إعانة علاج عاجلة ",
                "amount": "1800.00",
                "priority": "عاجلة",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending");
        assert_eq!(created["title"], "إعانة علاج عاجلة");
        let expected_due = now() + Duration::hours(24);
        assert_eq!(created["sla_due_at"], json!(expected_due));
        assert_eq!(created["sla"]["class"], "on_track");
        assert_eq!(created["badges"]["priority"]["key"], "urgent");

        let (status, listed) = call(&harness.state, "GET", "/api/v1/requests?status=pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        let (_, overdue) = call(&harness.state, "GET", "/api/v1/requests?overdue=true", None).await;
        assert_eq!(overdue.as_array().map(Vec::len), Some(0));

        let events =
            harness.audit.list_for_entity("beneficiary_request", created["id"].as_str().unwrap_or_default()).await.expect("audit");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "request.opened");
    }

    fn stored_request(id: &str, status: RequestStatus, due_in_hours: i64) -> BeneficiaryRequest {
        BeneficiaryRequest {
            id: RequestId(id.to_string()),
            beneficiary_id: BeneficiaryId("BEN-1".to_string()),
            kind: RequestKind::General,
            title: "تحديث بيانات الأسرة".to_string(),
            amount: None,
            status,
            priority: Priority::Medium,
            sla_due_at: Some(now() + Duration::hours(due_in_hours)),
            created_at: now() - Duration::hours(96),
            updated_at: now() - Duration::hours(96),
        }
    }

    #[tokio::test]
    async fn overdue_listing_applies_the_limit_after_filtering() {
        let harness = harness(None).await;
        harness
            .state
            .requests
            .save(stored_request("REQ-DONE", RequestStatus::Completed, -10))
            .await
            .expect("save closed");
        harness
            .state
            .requests
            .save(stored_request("REQ-LATE", RequestStatus::Pending, -1))
            .await
            .expect("save overdue");

        let (status, listed) =
            call(&harness.state, "GET", "/api/v1/requests?overdue=true&limit=1", None).await;

        assert_eq!(status, StatusCode::OK);
        let rows = listed.as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "REQ-LATE");
        assert_eq!(rows[0]["sla"]["class"], "overdue");

        let (_, first_page) = call(&harness.state, "GET", "/api/v1/requests?limit=1", None).await;
        assert_eq!(first_page[0]["id"], "REQ-LATE", "open requests list ahead of closed ones");
    }

    async fn open_general_request(state: &ApiState) -> String {
        let (status, created) = call(
            state,
            "POST",
            "/api/v1/requests",
            Some(json!({
                "beneficiary_id": "BEN-1",
                "kind": "general",
                "title": "تحديث بيانات الأسرة",
                "priority": "medium",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        created["id"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn status_route_walks_the_request_lifecycle() {
        let harness = harness(None).await;
        let id = open_general_request(&harness.state).await;
        let uri = format!("/api/v1/requests/{id}/status");

        let (status, reviewed) =
            call(&harness.state, "POST", &uri, Some(json!({ "status": "under_review" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviewed["status"], "under_review");

        let (skipped, payload) =
            call(&harness.state, "POST", &uri, Some(json!({ "status": "completed" }))).await;
        assert_eq!(skipped, StatusCode::CONFLICT);
        assert_eq!(payload["code"], "conflict");

        let (unknown, _) =
            call(&harness.state, "POST", &uri, Some(json!({ "status": "archived" }))).await;
        assert_eq!(unknown, StatusCode::BAD_REQUEST);

        let (approved, body) =
            call(&harness.state, "POST", &uri, Some(json!({ "status": "معتمد" }))).await;
        assert_eq!(approved, StatusCode::OK);
        assert_eq!(body["sla"]["class"], "completed");

        let (missing, _) = call(
            &harness.state,
            "POST",
            "/api/v1/requests/REQ-missing/status",
            Some(json!({ "status": "cancelled" })),
        )
        .await;
        assert_eq!(missing, StatusCode::NOT_FOUND);

        let events = harness.audit.list_for_entity("beneficiary_request", &id).await.expect("audit");
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(types, vec!["request.opened", "request.status_changed", "request.status_changed"]);
    }

    #[tokio::test]
    async fn status_route_requires_the_token_when_configured() {
        let harness = harness(Some(TOKEN)).await;
        harness
            .state
            .requests
            .save(stored_request("REQ-TOKEN", RequestStatus::Pending, 12))
            .await
            .expect("save");
        let body = json!({ "status": "cancelled" });

        let (missing, _) =
            call(&harness.state, "POST", "/api/v1/requests/REQ-TOKEN/status", Some(body.clone())).await;
        let (accepted, cancelled) = call_with_token(
            &harness.state,
            "POST",
            "/api/v1/requests/REQ-TOKEN/status",
            Some(body),
            Some(TOKEN),
        )
        .await;

        assert_eq!(missing, StatusCode::UNAUTHORIZED);
        assert_eq!(accepted, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");
    }

    #[tokio::test]
    async fn large_aid_request_is_routed_and_settled_by_its_approval() {
        let harness = harness(None).await;

        let (status, created) = call(
            &harness.state,
            "POST",
            "/api/v1/requests",
            Some(json!({
                "beneficiary_id": "BEN-2",
                "kind": "emergency_aid",
                "title": "ترميم مسكن متضرر",
                "amount": "7000.00",
                "priority": "high",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = created["id"].as_str().unwrap_or_default().to_string();
        assert_eq!(created["status"], "under_review");
        assert_eq!(created["approval"]["entity_type"], "emergency_aid");
        assert_eq!(created["approval"]["entity_id"], request_id.as_str());
        assert_eq!(created["approval"]["workflow_id"], "WF-AID");

        let status_uri = format!("/api/v1/requests/{request_id}/status");
        let (bypass, _) =
            call(&harness.state, "POST", &status_uri, Some(json!({ "status": "approved" }))).await;
        assert_eq!(bypass, StatusCode::CONFLICT, "the approval run decides routed requests");

        let approval_id = created["approval"]["id"].as_str().unwrap_or_default().to_string();
        let (decided, _) = call(
            &harness.state,
            "POST",
            &format!("/api/v1/approvals/{approval_id}/decision"),
            Some(decision(1, "nazer", "approve", None)),
        )
        .await;
        assert_eq!(decided, StatusCode::OK);

        let settled = harness
            .state
            .requests
            .find_by_id(&RequestId(request_id.clone()))
            .await
            .expect("find")
            .expect("request exists");
        assert_eq!(settled.status, RequestStatus::Approved);

        let (completed, _) =
            call(&harness.state, "POST", &status_uri, Some(json!({ "status": "completed" }))).await;
        assert_eq!(completed, StatusCode::OK);
    }

    #[tokio::test]
    async fn small_aid_request_stays_pending_without_a_workflow() {
        let harness = harness(None).await;

        let (status, created) = call(
            &harness.state,
            "POST",
            "/api/v1/requests",
            Some(json!({
                "beneficiary_id": "BEN-1",
                "kind": "emergency_aid",
                "title": "سداد فاتورة كهرباء",
                "amount": "900",
                "priority": "low",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending");
        assert!(created["approval"].is_null());
    }

    fn decimal(value: &Value) -> Decimal {
        value.as_str().and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }

    fn journal(debit: &str, credit: &str) -> Value {
        json!({
            "id": "JE-1",
            "entry_number": "JV-2026-0042",
            "entry_date": "2026-02-14",
            "description": "إثبات إيراد إيجار العمارة الوقفية",
            "status": "pending_approval",
            "lines": [
                { "account_code": "1101", "debit": debit, "credit": "0" },
                { "account_code": "4101", "debit": "0", "credit": credit },
            ],
        })
    }

    #[tokio::test]
    async fn journal_submission_routes_on_the_balanced_debit_total() {
        let harness = harness(None).await;

        let (status, started) = call(
            &harness.state,
            "POST",
            "/api/v1/approvals",
            Some(json!({
                "entity_type": "journal_entry",
                "entity_id": "JE-1",
                "journal_entry": journal("2500.00", "2500.00"),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(decimal(&started["approval"]["amount"]), Decimal::new(2_500, 0));
        assert_eq!(started["approval"]["workflow_id"], "WF-JRN");

        let (unbalanced, payload) = call(
            &harness.state,
            "POST",
            "/api/v1/approvals",
            Some(json!({
                "entity_type": "journal_entry",
                "entity_id": "JE-2",
                "journal_entry": journal("2500.00", "2400.00"),
            })),
        )
        .await;
        assert_eq!(unbalanced, StatusCode::BAD_REQUEST);
        assert!(payload["message"].as_str().unwrap_or_default().contains("JV-2026-0042"));

        let (mismatched, _) = call(
            &harness.state,
            "POST",
            "/api/v1/approvals",
            Some(json!({
                "entity_type": "journal_entry",
                "entity_id": "JE-3",
                "amount": "10",
                "journal_entry": journal("2500.00", "2500.00"),
            })),
        )
        .await;
        assert_eq!(mismatched, StatusCode::BAD_REQUEST);

        let (no_lines, _) = call(
            &harness.state,
            "POST",
            "/api/v1/approvals",
            Some(json!({ "entity_type": "journal_entry", "entity_id": "JE-4", "amount": "10" })),
        )
        .await;
        assert_eq!(no_lines, StatusCode::BAD_REQUEST);

        let (no_amount, _) = call(
            &harness.state,
            "POST",
            "/api/v1/approvals",
            Some(json!({ "entity_type": "payment", "entity_id": "PAY-9" })),
        )
        .await;
        assert_eq!(no_amount, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn distribution_preview_allocates_net_yield_by_weight() {
        let harness = harness(None).await;

        let (status, outcome) = call(
            &harness.state,
            "POST",
            "/api/v1/distributions/preview",
            Some(json!({
                "gross": "1000.00",
                "nazer_fee_pct": "10",
                "shares": [
                    { "beneficiary_id": "BEN-1", "weight": "2" },
                    { "beneficiary_id": "BEN-2", "weight": "1" },
                ],
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(decimal(&outcome["nazer_fee"]), Decimal::new(100, 0));
        assert_eq!(decimal(&outcome["net"]), Decimal::new(900, 0));
        assert_eq!(outcome["allocations"][0]["beneficiary_id"], "BEN-1");
        assert_eq!(decimal(&outcome["allocations"][0]["amount"]), Decimal::new(600, 0));
        assert_eq!(decimal(&outcome["allocations"][1]["amount"]), Decimal::new(300, 0));

        let (inactive, _) = call(
            &harness.state,
            "POST",
            "/api/v1/distributions/preview",
            Some(json!({
                "gross": "1000.00",
                "shares": [{ "beneficiary_id": "BEN-OLD", "weight": "1" }],
            })),
        )
        .await;
        assert_eq!(inactive, StatusCode::BAD_REQUEST);

        let (empty, payload) = call(
            &harness.state,
            "POST",
            "/api/v1/distributions/preview",
            Some(json!({ "gross": "1000.00", "shares": [] })),
        )
        .await;
        assert_eq!(empty, StatusCode::BAD_REQUEST);
        assert!(payload["message"].as_str().unwrap_or_default().contains("share"));
    }

    #[tokio::test]
    async fn open_request_rejects_unknown_or_inactive_beneficiaries() {
        let harness = harness(None).await;
        let body = |beneficiary: &str| {
            json!({
                "beneficiary_id": beneficiary,
                "kind": "general",
                "title": "طلب",
                "priority": "low",
            })
        };

        let (missing, _) = call(&harness.state, "POST", "/api/v1/requests", Some(body("BEN-404"))).await;
        let (inactive, payload) =
            call(&harness.state, "POST", "/api/v1/requests", Some(body("BEN-OLD"))).await;

        assert_eq!(missing, StatusCode::NOT_FOUND);
        assert_eq!(inactive, StatusCode::BAD_REQUEST);
        assert_eq!(payload["correlation_id"], "corr-test");
    }

    #[tokio::test]
    async fn unknown_status_filter_is_a_bad_request() {
        let harness = harness(None).await;

        let (status, payload) = call(&harness.state, "GET", "/api/v1/requests?status=archived", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["code"], "bad_request");
    }

    #[tokio::test]
    async fn amounts_below_every_workflow_need_no_approval() {
        let harness = harness(None).await;

        let (status, payload) = start_payment(&harness.state, "PAY-SMALL", "250.00").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["approval_required"], false);
        assert!(payload["approval"].is_null());
    }

    #[tokio::test]
    async fn approval_runs_through_decision_route_to_completion() {
        let harness = harness(None).await;
        let (status, started) = start_payment(&harness.state, "PAY-1", "12000").await;
        assert_eq!(status, StatusCode::CREATED);
        let id = started["approval"]["id"].as_str().unwrap_or_default().to_string();
        assert_eq!(started["approval"]["current_level"], 1);

        let (status, pending) =
            call(&harness.state, "GET", "/api/v1/approvals/pending?role=accountant", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().map(Vec::len), Some(1));

        let uri = format!("/api/v1/approvals/{id}/decision");
        let (status, skipped) =
            call(&harness.state, "POST", &uri, Some(decision(1, "accountant", "skip", None))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(skipped["current_level"], 2);

        let (status, approved) = call(
            &harness.state,
            "POST",
            &uri,
            Some(decision(2, "financial_manager", "approve", Some("مطابق"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");
        assert_eq!(approved["progress"]["percent_complete"], 100);
        assert_eq!(approved["badge"]["key"], "approved");

        let (status, fetched) = call(&harness.state, "GET", &format!("/api/v1/approvals/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["steps"].as_array().map(Vec::len), Some(2));
        assert_eq!(fetched["steps"][0]["action"], "skipped");

        let events = harness.audit.list_for_entity("payment", "PAY-1").await.expect("audit");
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "approval.started",
                "approval.step_skipped",
                "approval.step_approved",
                "approval.completed"
            ]
        );

        let (status, _) = call(
            &harness.state,
            "POST",
            &uri,
            Some(decision(2, "financial_manager", "approve", None)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn decision_errors_map_to_conflict_forbidden_and_bad_request() {
        let harness = harness(None).await;
        let (_, started) = start_payment(&harness.state, "PAY-2", "90000").await;
        let id = started["approval"]["id"].as_str().unwrap_or_default().to_string();
        let uri = format!("/api/v1/approvals/{id}/decision");

        let (out_of_order, _) = call(
            &harness.state,
            "POST",
            &uri,
            Some(decision(2, "financial_manager", "approve", None)),
        )
        .await;
        assert_eq!(out_of_order, StatusCode::CONFLICT);

        // 90,000 is above the accountant's limit.
        let (over_limit, payload) =
            call(&harness.state, "POST", &uri, Some(decision(1, "accountant", "approve", None))).await;
        assert_eq!(over_limit, StatusCode::FORBIDDEN);
        assert_eq!(payload["code"], "forbidden");

        let (no_reason, _) =
            call(&harness.state, "POST", &uri, Some(decision(1, "nazer", "reject", Some("  ")))).await;
        assert_eq!(no_reason, StatusCode::BAD_REQUEST);

        let (missing, _) = call(
            &harness.state,
            "POST",
            "/api/v1/approvals/APR-missing/decision",
            Some(decision(1, "nazer", "approve", None)),
        )
        .await;
        assert_eq!(missing, StatusCode::NOT_FOUND);

        let events = harness.audit.list_for_entity("payment", "PAY-2").await.expect("audit");
        assert!(events.iter().any(|event| event.event_type == "approval.transition_rejected"));
    }

    #[tokio::test]
    async fn duplicate_submission_for_a_pending_entity_conflicts() {
        let harness = harness(None).await;
        let (first, _) = start_payment(&harness.state, "PAY-3", "5000").await;
        let (second, payload) = start_payment(&harness.state, "PAY-3", "5000").await;

        assert_eq!(first, StatusCode::CREATED);
        assert_eq!(second, StatusCode::CONFLICT);
        assert_eq!(payload["code"], "conflict");
    }

    #[tokio::test]
    async fn mutating_routes_require_the_configured_token() {
        let harness = harness(Some(TOKEN)).await;
        let body = json!({ "entity_type": "payment", "entity_id": "PAY-4", "amount": "5000" });

        let (missing, _) = call(&harness.state, "POST", "/api/v1/approvals", Some(body.clone())).await;
        let (wrong, _) = call_with_token(
            &harness.state,
            "POST",
            "/api/v1/approvals",
            Some(body.clone()),
            Some("not-the-token-at-all"),
        )
        .await;
        let (accepted, _) =
            call_with_token(&harness.state, "POST", "/api/v1/approvals", Some(body), Some(TOKEN)).await;
        let (read, _) = call(&harness.state, "GET", "/api/v1/approvals/pending", None).await;

        assert_eq!(missing, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, StatusCode::UNAUTHORIZED);
        assert_eq!(accepted, StatusCode::CREATED);
        assert_eq!(read, StatusCode::OK);
    }

    #[tokio::test]
    async fn report_route_renders_html() {
        let harness = harness(None).await;

        let response = router(harness.state.clone())
            .oneshot(
                Request::builder().uri("/reports/requests").body(Body::empty()).expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("تقرير مهل الطلبات"));
    }
}
