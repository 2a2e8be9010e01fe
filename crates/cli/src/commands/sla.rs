use chrono::{DateTime, Utc};
use serde::Serialize;
use waqf_core::display::sla_badge;
use waqf_core::domain::request::BeneficiaryRequest;
use waqf_core::sla::{SlaClass, SlaPolicy};
use waqf_db::repositories::{RequestFilter, RequestRepository, SqlRequestRepository};

use crate::commands::{
    build_runtime, load_config, open_pool, CommandResult, EXIT_MIGRATION, EXIT_RUNTIME,
};

const SNAPSHOT_LIMIT: u32 = 1_000;

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
struct ClassCounts {
    overdue: usize,
    due_soon: usize,
    on_track: usize,
}

#[derive(Debug, Serialize)]
struct SlaLine {
    request_id: String,
    beneficiary_id: String,
    status: &'static str,
    priority: &'static str,
    class: SlaClass,
    label: &'static str,
    remaining: Option<String>,
    sla_due_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct SlaSnapshot {
    generated_at: String,
    counts: ClassCounts,
    requests: Vec<SlaLine>,
}

/// Open requests with their SLA class, overdue first. Terminal requests are left out.
pub fn run(json_output: bool) -> CommandResult {
    let config = match load_config("sla") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("sla") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let listed = SqlRequestRepository::new(pool.clone())
            .list(&RequestFilter::open(), SNAPSHOT_LIMIT)
            .await
            .map_err(|error| {
                ("query", format!("{error}; has `waqf migrate` run?"), EXIT_MIGRATION)
            });
        pool.close().await;
        listed
    });

    let requests = match result {
        Ok(requests) => requests,
        Err(step) => return CommandResult::from_step("sla", step),
    };

    let snapshot = build_snapshot(&requests, &SlaPolicy::from_config(&config.sla), Utc::now());
    if json_output {
        return match serde_json::to_string(&snapshot) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => {
                CommandResult::failure("sla", "serialization", error.to_string(), EXIT_RUNTIME)
            }
        };
    }

    CommandResult { exit_code: 0, output: render_human(&snapshot) }
}

fn build_snapshot(
    requests: &[BeneficiaryRequest],
    policy: &SlaPolicy,
    now: DateTime<Utc>,
) -> SlaSnapshot {
    let mut counts = ClassCounts::default();
    let mut lines = requests
        .iter()
        .filter(|request| !request.status.is_terminal())
        .map(|request| {
            let assessment = policy.assess_status(request.sla_due_at, request.status, now);
            match assessment.class {
                SlaClass::Overdue => counts.overdue += 1,
                SlaClass::DueSoon => counts.due_soon += 1,
                SlaClass::OnTrack => counts.on_track += 1,
                SlaClass::Completed => {}
            }
            SlaLine {
                request_id: request.id.0.clone(),
                beneficiary_id: request.beneficiary_id.0.clone(),
                status: request.status.as_str(),
                priority: request.priority.as_str(),
                class: assessment.class,
                label: sla_badge(assessment.class).label,
                remaining: assessment.label,
                sla_due_at: request.sla_due_at.map(|due| due.to_rfc3339()),
            }
        })
        .collect::<Vec<_>>();
    lines.sort_by_key(|line| match line.class {
        SlaClass::Overdue => 0,
        SlaClass::DueSoon => 1,
        _ => 2,
    });

    SlaSnapshot { generated_at: now.to_rfc3339(), counts, requests: lines }
}

fn render_human(snapshot: &SlaSnapshot) -> String {
    let mut lines = vec![format!(
        "sla: {} overdue, {} due soon, {} on track",
        snapshot.counts.overdue, snapshot.counts.due_soon, snapshot.counts.on_track
    )];

    for line in &snapshot.requests {
        let marker = match line.class {
            SlaClass::Overdue => "late",
            SlaClass::DueSoon => "soon",
            _ => "ok",
        };
        lines.push(format!(
            "- [{marker}] {} ({}, {}) {}",
            line.request_id,
            line.status,
            line.priority,
            line.remaining.as_deref().unwrap_or("no deadline")
        ));
    }

    lines.join("\n")
}
