//! HTML SLA report for beneficiary requests.
//!
//! Rendering only: rows arrive already fetched and classified, and the template
//! is embedded so the report works without a templates directory on disk.

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Html,
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::info;
use waqf_core::display::{priority_badge, request_status_badge, sla_badge, Badge};
use waqf_core::domain::request::{BeneficiaryRequest, RequestStatus};
use waqf_core::sla::{Clock, SlaClass, SlaPolicy};
use waqf_db::repositories::RequestFilter;

use crate::api::{
    correlation_id, internal_error, parse_status_filter, repository_error, ApiError, ApiState,
};

const REQUESTS_TEMPLATE: &str = "requests.html";
const REPORT_ROW_LIMIT: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

/// Register the filters report templates rely on.
///
/// - `money`: decimal amount with two places and thousands separators, `-` when absent
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::Null => return Ok(tera::Value::String("-".to_string())),
        tera::Value::String(raw) => Decimal::from_str(raw)
            .map_err(|e| tera::Error::msg(format!("money filter: invalid amount `{raw}`: {e}")))?,
        tera::Value::Number(number) => Decimal::from_str(&number.to_string())
            .map_err(|e| tera::Error::msg(format!("money filter: invalid amount: {e}")))?,
        _ => return Err(tera::Error::msg("money filter expects a number or decimal string")),
    };
    Ok(tera::Value::String(format_money(amount)))
}

/// `1234567.5` renders as `1,234,567.50`.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}

#[derive(Clone, Debug)]
pub struct ReportRenderer {
    tera: Tera,
}

impl ReportRenderer {
    pub fn embedded() -> Result<Self, ReportError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_template(
            REQUESTS_TEMPLATE,
            include_str!("../../../templates/reports/requests.html"),
        )?;
        Ok(Self { tera })
    }

    /// Renderer without templates; every render fails with a template error.
    pub fn unavailable() -> Self {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        Self { tera }
    }

    pub fn render_requests(&self, report: &RequestReport) -> Result<String, ReportError> {
        let context = Context::from_serialize(report)?;
        Ok(self.tera.render(REQUESTS_TEMPLATE, &context)?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SlaCounts {
    pub overdue: usize,
    pub due_soon: usize,
    pub on_track: usize,
    pub completed: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportRow {
    pub id: String,
    pub title: String,
    pub beneficiary_id: String,
    pub status: Badge,
    pub priority: Badge,
    pub sla: Badge,
    pub remaining: String,
    pub amount: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RequestReport {
    pub generated_at: String,
    pub status_filter: Option<String>,
    pub counts: SlaCounts,
    pub rows: Vec<ReportRow>,
}

/// Classifies `requests` at `now`. Overdue rows come first, then by deadline as fetched.
pub fn build_request_report(
    requests: &[BeneficiaryRequest],
    policy: &SlaPolicy,
    status_filter: Option<RequestStatus>,
    now: DateTime<Utc>,
) -> RequestReport {
    let mut counts = SlaCounts::default();
    let mut rows: Vec<(SlaClass, ReportRow)> = requests
        .iter()
        .map(|request| {
            let assessment = policy.assess_status(request.sla_due_at, request.status, now);
            match assessment.class {
                SlaClass::Overdue => counts.overdue += 1,
                SlaClass::DueSoon => counts.due_soon += 1,
                SlaClass::OnTrack => counts.on_track += 1,
                SlaClass::Completed => counts.completed += 1,
            }
            let row = ReportRow {
                id: request.id.0.clone(),
                title: request.title.clone(),
                beneficiary_id: request.beneficiary_id.0.clone(),
                status: request_status_badge(request.status),
                priority: priority_badge(request.priority),
                sla: sla_badge(assessment.class),
                remaining: assessment.label.unwrap_or_else(|| "-".to_string()),
                amount: request.amount,
            };
            (assessment.class, row)
        })
        .collect();
    rows.sort_by_key(|(class, _)| match class {
        SlaClass::Overdue => 0,
        SlaClass::DueSoon => 1,
        SlaClass::OnTrack => 2,
        SlaClass::Completed => 3,
    });

    RequestReport {
        generated_at: now.format("%Y-%m-%d %H:%M UTC").to_string(),
        status_filter: status_filter.map(|status| request_status_badge(status).label.to_string()),
        counts,
        rows: rows.into_iter().map(|(_, row)| row).collect(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub status: Option<String>,
}

pub async fn requests_report(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
) -> Result<Html<String>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let status = parse_status_filter(query.status.as_deref(), &correlation_id)?;
    let requests = state
        .requests
        .list(&RequestFilter::with_status(status), REPORT_ROW_LIMIT)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    let report = build_request_report(&requests, &state.sla, status, state.clock.now());
    let html = state
        .reports
        .render_requests(&report)
        .map_err(|error| internal_error(error.to_string(), &correlation_id))?;

    info!(
        event_name = "report.requests.rendered",
        correlation_id = %correlation_id,
        rows = report.rows.len(),
        overdue = report.counts.overdue,
        "request SLA report rendered"
    );

    Ok(Html(html))
}
