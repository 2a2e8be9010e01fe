use chrono::{DateTime, Duration, TimeZone, Utc};

use waqf_core::approvals::engine::{ApprovalDecision, ApprovalEngine};
use waqf_core::domain::approval::{ApprovalState, StepAction};
use waqf_db::repositories::{ApprovalRepository, RepositoryError, SqlApprovalRepository};
use waqf_db::{connect_with_settings, migrations, DbPool, WaqfSeedDataset};

type SeedContractTestResult<T = ()> = Result<T, String>;

fn seed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 7, 30, 0).single().expect("time")
}

async fn seeded_pool() -> SeedContractTestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    WaqfSeedDataset::load(&pool, seed_time()).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

fn decision(level: u32, name: &str, role: &str, action: StepAction) -> ApprovalDecision {
    ApprovalDecision {
        level,
        approver_name: name.to_string(),
        approver_role: role.to_string(),
        action,
        notes: Some("مطابق للمستندات".to_string()),
    }
}

#[tokio::test]
async fn seeded_payment_approval_runs_to_completion() -> SeedContractTestResult {
    let pool = seeded_pool().await?;
    let repo = SqlApprovalRepository::new(pool);
    let engine = ApprovalEngine::default();

    let pending = repo.list_pending(None, 10).await.map_err(|e| e.to_string())?;
    let approval_id = pending
        .first()
        .map(|pending| pending.status.id.clone())
        .ok_or("seed should leave one pending approval")?;

    let decisions = [
        decision(1, "سعاد", "accountant", StepAction::Skipped),
        decision(2, "ناصر", "financial_manager", StepAction::Approved),
        decision(3, "الناظر عبدالرحمن", "nazer", StepAction::Approved),
    ];

    for (offset, decision) in decisions.iter().enumerate() {
        let status = repo
            .find_by_id(&approval_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("approval should exist")?;
        let steps = repo.steps_for(&approval_id).await.map_err(|e| e.to_string())?;
        let transition = engine
            .act(&status, &steps, decision, seed_time() + Duration::minutes(offset as i64 + 1))
            .map_err(|e| e.to_string())?;
        repo.record_transition(&transition).await.map_err(|e| e.to_string())?;
    }

    let finished = repo
        .find_by_id(&approval_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("approval should exist")?;
    if finished.status != ApprovalState::Approved {
        return Err(format!("expected approved, got {:?}", finished.status));
    }
    if finished.completed_at.is_none() {
        return Err("completed_at should be set".to_string());
    }
    if !repo.list_pending(None, 10).await.map_err(|e| e.to_string())?.is_empty() {
        return Err("no approvals should remain pending".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn stale_transition_is_reported_as_conflict() -> SeedContractTestResult {
    let pool = seeded_pool().await?;
    let repo = SqlApprovalRepository::new(pool);
    let engine = ApprovalEngine::default();

    let pending = repo.list_pending(Some("accountant"), 10).await.map_err(|e| e.to_string())?;
    let status = pending.first().map(|p| p.status.clone()).ok_or("pending approval")?;
    let steps = repo.steps_for(&status.id).await.map_err(|e| e.to_string())?;

    let approve = decision(1, "سعاد", "accountant", StepAction::Approved);
    let first = engine.act(&status, &steps, &approve, seed_time()).map_err(|e| e.to_string())?;
    let stale = engine.act(&status, &steps, &approve, seed_time()).map_err(|e| e.to_string())?;

    repo.record_transition(&first).await.map_err(|e| e.to_string())?;
    match repo.record_transition(&stale).await {
        Err(RepositoryError::Conflict(_)) => Ok(()),
        other => Err(format!("expected conflict, got {other:?}")),
    }
}
