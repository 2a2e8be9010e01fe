//! Display categories for finite domain values.
//!
//! Every status, priority and SLA class maps to exactly one row here. Badge
//! rendering and label parsing both read these tables.

use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalState;
use crate::domain::request::{Priority, RequestStatus};
use crate::sla::SlaClass;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTone {
    Neutral,
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub key: &'static str,
    pub label: &'static str,
    pub tone: BadgeTone,
}

struct Row<T> {
    value: T,
    badge: Badge,
    aliases: &'static [&'static str],
}

const fn row<T>(
    value: T,
    key: &'static str,
    label: &'static str,
    tone: BadgeTone,
    aliases: &'static [&'static str],
) -> Row<T> {
    Row { value, badge: Badge { key, label, tone }, aliases }
}

const REQUEST_STATUSES: &[Row<RequestStatus>] = &[
    row(RequestStatus::Pending, "pending", "معلق", BadgeTone::Neutral, &["جديد", "قيد الانتظار", "new"]),
    row(
        RequestStatus::UnderReview,
        "under_review",
        "قيد المراجعة",
        BadgeTone::Info,
        &["in_review", "reviewing", "قيد المعالجة"],
    ),
    row(RequestStatus::Approved, "approved", "معتمد", BadgeTone::Success, &["موافق عليه", "موافق"]),
    row(RequestStatus::Rejected, "rejected", "مرفوض", BadgeTone::Danger, &["declined"]),
    row(RequestStatus::Completed, "completed", "مكتمل", BadgeTone::Success, &["منجز", "منفذ", "done"]),
    row(RequestStatus::Cancelled, "cancelled", "ملغي", BadgeTone::Neutral, &["canceled", "ملغى"]),
];

const PRIORITIES: &[Row<Priority>] = &[
    row(Priority::Low, "low", "منخفضة", BadgeTone::Neutral, &["منخفض"]),
    row(Priority::Medium, "medium", "متوسطة", BadgeTone::Info, &["normal", "متوسط", "عادية"]),
    row(Priority::High, "high", "عالية", BadgeTone::Warning, &["عالي", "مهم"]),
    row(Priority::Urgent, "urgent", "عاجلة", BadgeTone::Danger, &["عاجل", "critical"]),
];

const SLA_CLASSES: &[Row<SlaClass>] = &[
    row(SlaClass::Completed, "completed", "مكتمل", BadgeTone::Success, &[]),
    row(SlaClass::Overdue, "overdue", "متأخر", BadgeTone::Danger, &[]),
    row(SlaClass::DueSoon, "due_soon", "يستحق قريبا", BadgeTone::Warning, &[]),
    row(SlaClass::OnTrack, "on_track", "ضمن المهلة", BadgeTone::Info, &[]),
];

const APPROVAL_STATES: &[Row<ApprovalState>] = &[
    row(ApprovalState::Pending, "pending", "بانتظار الاعتماد", BadgeTone::Warning, &[]),
    row(ApprovalState::Approved, "approved", "معتمد", BadgeTone::Success, &[]),
    row(ApprovalState::Rejected, "rejected", "مرفوض", BadgeTone::Danger, &[]),
];

pub fn request_status_badge(status: RequestStatus) -> Badge {
    badge_for(REQUEST_STATUSES, status)
}

pub fn priority_badge(priority: Priority) -> Badge {
    badge_for(PRIORITIES, priority)
}

pub fn sla_badge(class: SlaClass) -> Badge {
    badge_for(SLA_CLASSES, class)
}

pub fn approval_state_badge(state: ApprovalState) -> Badge {
    badge_for(APPROVAL_STATES, state)
}

pub fn request_status_from_label(raw: &str) -> Option<RequestStatus> {
    lookup(REQUEST_STATUSES, raw)
}

pub fn priority_from_label(raw: &str) -> Option<Priority> {
    lookup(PRIORITIES, raw)
}

fn badge_for<T: Copy + PartialEq>(table: &[Row<T>], value: T) -> Badge {
    table.iter().find(|row| row.value == value).map(|row| row.badge).unwrap_or(Badge {
        key: "unknown",
        label: "غير معروف",
        tone: BadgeTone::Neutral,
    })
}

fn lookup<T: Copy>(table: &[Row<T>], raw: &str) -> Option<T> {
    let needle = normalize_label(raw);
    if needle.is_empty() {
        return None;
    }

    table
        .iter()
        .find(|row| {
            normalize_label(row.badge.key) == needle
                || normalize_label(row.badge.label) == needle
                || row.aliases.iter().any(|alias| normalize_label(alias) == needle)
        })
        .map(|row| row.value)
}

fn normalize_label(raw: &str) -> String {
    raw.split(|ch: char| ch.is_whitespace() || ch == '-' || ch == '_')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::{
        approval_state_badge, priority_badge, priority_from_label, request_status_badge,
        request_status_from_label, sla_badge, BadgeTone, APPROVAL_STATES, PRIORITIES,
        REQUEST_STATUSES, SLA_CLASSES,
    };
    use crate::domain::approval::ApprovalState;
    use crate::domain::request::{Priority, RequestStatus};
    use crate::sla::SlaClass;

    #[test]
    fn every_request_status_round_trips_through_its_label() {
        for row in REQUEST_STATUSES {
            assert_eq!(request_status_from_label(row.badge.label), Some(row.value));
            assert_eq!(request_status_from_label(row.badge.key), Some(row.value));
        }
    }

    #[test]
    fn tables_have_one_row_per_value() {
        assert_eq!(REQUEST_STATUSES.len(), 6);
        assert_eq!(PRIORITIES.len(), 4);
        assert_eq!(SLA_CLASSES.len(), 4);
        assert_eq!(APPROVAL_STATES.len(), 3);
    }

    #[test]
    fn parsing_tolerates_case_spacing_and_separators() {
        assert_eq!(request_status_from_label("  UNDER-review "), Some(RequestStatus::UnderReview));
        assert_eq!(request_status_from_label("قيد   المراجعة"), Some(RequestStatus::UnderReview));
        assert_eq!(priority_from_label("عاجل"), Some(Priority::Urgent));
        assert_eq!(priority_from_label(""), None);
    }

    #[test]
    fn tones_match_urgency() {
        assert_eq!(sla_badge(SlaClass::Overdue).tone, BadgeTone::Danger);
        assert_eq!(sla_badge(SlaClass::DueSoon).tone, BadgeTone::Warning);
        assert_eq!(priority_badge(Priority::Urgent).tone, BadgeTone::Danger);
        assert_eq!(request_status_badge(RequestStatus::Approved).tone, BadgeTone::Success);
        assert_eq!(approval_state_badge(ApprovalState::Pending).label, "بانتظار الاعتماد");
    }
}
