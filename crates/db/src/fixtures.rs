//! Deterministic demo dataset for local runs and smoke tests.
//!
//! Deadlines are placed relative to the `now` passed to [`WaqfSeedDataset::load`]
//! so a fresh seed always shows every SLA class on the dashboard.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use waqf_core::approvals::engine::ApprovalEngine;
use waqf_core::domain::approval::{
    ApprovalLevel, ApprovalWorkflow, EntityType, WorkflowConditions, WorkflowId,
};
use waqf_core::domain::beneficiary::{Beneficiary, BeneficiaryId};
use waqf_core::domain::request::{
    BeneficiaryRequest, Priority, RequestId, RequestKind, RequestStatus,
};

use crate::repositories::{
    ApprovalRepository, BeneficiaryRepository, RepositoryError, RequestRepository,
    SqlApprovalRepository, SqlBeneficiaryRepository, SqlRequestRepository,
    SqlWorkflowRepository, WorkflowRepository,
};
use crate::DbPool;

pub struct WaqfSeedDataset;

struct SeedBeneficiary {
    id: &'static str,
    full_name: &'static str,
    national_id: &'static str,
    category: &'static str,
    phone: Option<&'static str>,
}

const SEED_BENEFICIARIES: [SeedBeneficiary; 3] = [
    SeedBeneficiary {
        id: "BEN-0001",
        full_name: "فاطمة أحمد العتيبي",
        national_id: "1010000001",
        category: "أرملة",
        phone: Some("0551000001"),
    },
    SeedBeneficiary {
        id: "BEN-0002",
        full_name: "خالد سعد القحطاني",
        national_id: "1010000002",
        category: "أسرة محتاجة",
        phone: Some("0551000002"),
    },
    SeedBeneficiary {
        id: "BEN-0003",
        full_name: "مريم علي الحربي",
        national_id: "1010000003",
        category: "طالب علم",
        phone: None,
    },
];

struct SeedWorkflow {
    id: &'static str,
    name: &'static str,
    entity_type: EntityType,
    levels: &'static [(u32, &'static str, bool)],
    min_amount: Option<i64>,
    max_amount: Option<i64>,
}

const SEED_WORKFLOWS: [SeedWorkflow; 5] = [
    SeedWorkflow {
        id: "WF-PAYMENT",
        name: "اعتماد المدفوعات",
        entity_type: EntityType::Payment,
        levels: &[(1, "accountant", false), (2, "financial_manager", true), (3, "nazer", true)],
        min_amount: None,
        max_amount: None,
    },
    SeedWorkflow {
        id: "WF-LOAN",
        name: "اعتماد القروض الحسنة",
        entity_type: EntityType::Loan,
        levels: &[(1, "financial_manager", true), (2, "nazer", true)],
        min_amount: None,
        max_amount: None,
    },
    SeedWorkflow {
        id: "WF-EMERGENCY",
        name: "اعتماد الإعانات العاجلة",
        entity_type: EntityType::EmergencyAid,
        levels: &[(1, "financial_manager", true)],
        min_amount: None,
        max_amount: Some(50_000),
    },
    SeedWorkflow {
        id: "WF-DISTRIBUTION",
        name: "اعتماد توزيع الغلة",
        entity_type: EntityType::Distribution,
        levels: &[(1, "financial_manager", true), (2, "nazer", true), (3, "board", true)],
        min_amount: None,
        max_amount: None,
    },
    SeedWorkflow {
        id: "WF-JOURNAL",
        name: "اعتماد القيود اليومية",
        entity_type: EntityType::JournalEntry,
        levels: &[(1, "accountant", true), (2, "financial_manager", true)],
        min_amount: None,
        max_amount: None,
    },
];

struct SeedRequest {
    id: &'static str,
    beneficiary_id: &'static str,
    kind: RequestKind,
    title: &'static str,
    amount_cents: Option<i64>,
    status: RequestStatus,
    priority: Priority,
    /// Deadline offset from the seed time in minutes; `None` leaves it unset.
    due_in_minutes: Option<i64>,
    expected_class: &'static str,
}

const SEED_REQUESTS: [SeedRequest; 6] = [
    SeedRequest {
        id: "REQ-SEED-OVERDUE",
        beneficiary_id: "BEN-0001",
        kind: RequestKind::EmergencyAid,
        title: "إعانة عاجلة لسداد إيجار متأخر",
        amount_cents: Some(450_000),
        status: RequestStatus::UnderReview,
        priority: Priority::Urgent,
        due_in_minutes: Some(-150),
        expected_class: "overdue",
    },
    SeedRequest {
        id: "REQ-SEED-DUESOON",
        beneficiary_id: "BEN-0002",
        kind: RequestKind::Loan,
        title: "قرض حسن لترميم المنزل",
        amount_cents: Some(2_000_000),
        status: RequestStatus::Pending,
        priority: Priority::High,
        due_in_minutes: Some(3 * 60 + 20),
        expected_class: "due_soon",
    },
    SeedRequest {
        id: "REQ-SEED-ONTRACK",
        beneficiary_id: "BEN-0003",
        kind: RequestKind::General,
        title: "طلب كفالة رسوم دراسية",
        amount_cents: None,
        status: RequestStatus::Pending,
        priority: Priority::Medium,
        due_in_minutes: Some(2 * 24 * 60),
        expected_class: "on_track",
    },
    SeedRequest {
        id: "REQ-SEED-NODEADLINE",
        beneficiary_id: "BEN-0003",
        kind: RequestKind::General,
        title: "تحديث بيانات الأسرة",
        amount_cents: None,
        status: RequestStatus::Pending,
        priority: Priority::Low,
        due_in_minutes: None,
        expected_class: "on_track",
    },
    SeedRequest {
        id: "REQ-SEED-COMPLETED",
        beneficiary_id: "BEN-0001",
        kind: RequestKind::EmergencyAid,
        title: "إعانة علاج مكتملة",
        amount_cents: Some(120_000),
        status: RequestStatus::Completed,
        priority: Priority::High,
        due_in_minutes: Some(-24 * 60),
        expected_class: "completed",
    },
    SeedRequest {
        id: "REQ-SEED-CANCELLED",
        beneficiary_id: "BEN-0002",
        kind: RequestKind::General,
        title: "طلب ملغى بطلب المستفيد",
        amount_cents: None,
        status: RequestStatus::Cancelled,
        priority: Priority::Low,
        due_in_minutes: Some(-60),
        expected_class: "completed",
    },
];

const SEED_APPROVAL_ENTITY: &str = "PAY-SEED-0001";
const SEED_APPROVAL_AMOUNT_CENTS: i64 = 4_000_000;

impl WaqfSeedDataset {
    /// Upserts the dataset. Safe to run repeatedly; the demo approval is only
    /// started once per database.
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let beneficiaries = SqlBeneficiaryRepository::new(pool.clone());
        for seed in &SEED_BENEFICIARIES {
            beneficiaries
                .save(Beneficiary {
                    id: BeneficiaryId(seed.id.to_string()),
                    full_name: seed.full_name.to_string(),
                    national_id: seed.national_id.to_string(),
                    category: seed.category.to_string(),
                    phone: seed.phone.map(str::to_string),
                    active: true,
                    created_at: now - Duration::days(30),
                })
                .await?;
        }

        let workflows = SqlWorkflowRepository::new(pool.clone());
        for seed in &SEED_WORKFLOWS {
            workflows.save(seed_workflow(seed, now)).await?;
        }

        let requests = SqlRequestRepository::new(pool.clone());
        let mut requests_seeded = Vec::with_capacity(SEED_REQUESTS.len());
        for seed in &SEED_REQUESTS {
            requests.save(seed_request(seed, now)).await?;
            requests_seeded.push(RequestSeedInfo {
                request_id: seed.id,
                status: seed.status.as_str(),
                expected_class: seed.expected_class,
            });
        }

        let approvals = SqlApprovalRepository::new(pool.clone());
        let existing = approvals.find_for_entity(EntityType::Payment, SEED_APPROVAL_ENTITY).await?;
        let approval_id = match existing.first() {
            Some(status) => status.id.0.clone(),
            None => {
                let workflow = workflows
                    .find_by_id(&WorkflowId("WF-PAYMENT".to_string()))
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound("workflow WF-PAYMENT".to_string()))?;
                let (status, steps) = ApprovalEngine::default()
                    .start(
                        &workflow,
                        SEED_APPROVAL_ENTITY,
                        Decimal::new(SEED_APPROVAL_AMOUNT_CENTS, 2),
                        now,
                    )
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?;
                let approval_id = status.id.0.clone();
                approvals.save_started(status, steps).await?;
                approval_id
            }
        };

        tracing::debug!(
            event_name = "db.seed.loaded",
            beneficiaries = SEED_BENEFICIARIES.len(),
            workflows = SEED_WORKFLOWS.len(),
            requests = requests_seeded.len(),
            approval_id = %approval_id,
            "seed dataset loaded"
        );

        Ok(SeedResult {
            beneficiaries_seeded: SEED_BENEFICIARIES.len(),
            workflows_seeded: SEED_WORKFLOWS.len(),
            requests_seeded,
            approval_id,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for seed in &SEED_BENEFICIARIES {
            checks.push((seed.id, exists(pool, "beneficiaries", seed.id).await?));
        }
        for seed in &SEED_WORKFLOWS {
            checks.push((seed.id, exists(pool, "approval_workflows", seed.id).await?));
        }
        for seed in &SEED_REQUESTS {
            checks.push((seed.id, exists(pool, "beneficiary_requests", seed.id).await?));
        }

        let approval_present: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM approval_status WHERE entity_type = ?1 AND entity_id = ?2)",
        )
        .bind(EntityType::Payment.as_str())
        .bind(SEED_APPROVAL_ENTITY)
        .fetch_one(pool)
        .await?;
        checks.push((SEED_APPROVAL_ENTITY, approval_present));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

async fn exists(pool: &DbPool, table: &str, id: &str) -> Result<bool, RepositoryError> {
    let present: bool =
        sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"))
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(present)
}

fn seed_workflow(seed: &SeedWorkflow, now: DateTime<Utc>) -> ApprovalWorkflow {
    ApprovalWorkflow {
        id: WorkflowId(seed.id.to_string()),
        name: seed.name.to_string(),
        entity_type: seed.entity_type,
        levels: seed
            .levels
            .iter()
            .map(|(level, role, required)| ApprovalLevel {
                level: *level,
                approver_role: (*role).to_string(),
                required: *required,
            })
            .collect(),
        conditions: WorkflowConditions {
            min_amount: seed.min_amount.map(Decimal::from),
            max_amount: seed.max_amount.map(Decimal::from),
        },
        active: true,
        created_at: now - Duration::days(30),
    }
}

fn seed_request(seed: &SeedRequest, now: DateTime<Utc>) -> BeneficiaryRequest {
    let created_at = now - Duration::days(2);
    BeneficiaryRequest {
        id: RequestId(seed.id.to_string()),
        beneficiary_id: BeneficiaryId(seed.beneficiary_id.to_string()),
        kind: seed.kind,
        title: seed.title.to_string(),
        amount: seed.amount_cents.map(|cents| Decimal::new(cents, 2)),
        status: seed.status,
        priority: seed.priority,
        sla_due_at: seed.due_in_minutes.map(|minutes| now + Duration::minutes(minutes)),
        created_at,
        updated_at: created_at,
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub beneficiaries_seeded: usize,
    pub workflows_seeded: usize,
    pub requests_seeded: Vec<RequestSeedInfo>,
    pub approval_id: String,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub status: &'static str,
    /// SLA class the request shows when assessed at the seed time.
    pub expected_class: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
