//! SLA urgency classification for open requests.
//!
//! Terminal statuses are always `Completed`. Otherwise the remaining time to
//! `sla_due_at` decides: negative is overdue, zero up to the due-soon
//! threshold (exclusive) is due-soon, anything at or past it is on-track.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SlaConfig;
use crate::domain::request::{Priority, RequestStatus};
use crate::errors::DomainError;

pub const DEFAULT_DUE_SOON_HOURS: u32 = 6;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaClass {
    Completed,
    Overdue,
    DueSoon,
    OnTrack,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaAssessment {
    pub class: SlaClass,
    /// Whole minutes remaining, or elapsed past the deadline when overdue. Never negative.
    pub remaining_minutes: Option<i64>,
    pub label: Option<String>,
}

impl SlaAssessment {
    fn completed() -> Self {
        Self { class: SlaClass::Completed, remaining_minutes: None, label: None }
    }

    fn with_duration(class: SlaClass, duration: Duration) -> Self {
        Self {
            class,
            remaining_minutes: Some(duration.num_minutes()),
            label: Some(format_duration(duration)),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_minutes.map(Duration::minutes)
    }
}

/// Response windows per priority, in hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTargets {
    pub urgent_hours: u32,
    pub high_hours: u32,
    pub medium_hours: u32,
    pub low_hours: u32,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self { urgent_hours: 24, high_hours: 48, medium_hours: 72, low_hours: 120 }
    }
}

impl SlaTargets {
    pub fn hours_for(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Urgent => self.urgent_hours,
            Priority::High => self.high_hours,
            Priority::Medium => self.medium_hours,
            Priority::Low => self.low_hours,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlaPolicy {
    due_soon: Duration,
    targets: SlaTargets,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DUE_SOON_HOURS, SlaTargets::default())
    }
}

impl SlaPolicy {
    pub fn new(due_soon_hours: u32, targets: SlaTargets) -> Self {
        Self { due_soon: Duration::hours(i64::from(due_soon_hours)), targets }
    }

    pub fn from_config(config: &SlaConfig) -> Self {
        Self::new(
            config.due_soon_hours,
            SlaTargets {
                urgent_hours: config.urgent_hours,
                high_hours: config.high_hours,
                medium_hours: config.medium_hours,
                low_hours: config.low_hours,
            },
        )
    }

    pub fn due_soon_threshold(&self) -> Duration {
        self.due_soon
    }

    pub fn targets(&self) -> SlaTargets {
        self.targets
    }

    /// Deadline assigned to a request opened at `created_at`. Fails instead of
    /// wrapping when the target pushes past the representable calendar.
    pub fn due_at(
        &self,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DomainError> {
        let hours = self.targets.hours_for(priority);
        Duration::try_hours(i64::from(hours))
            .and_then(|window| created_at.checked_add_signed(window))
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "sla target of {hours} hours for {} priority overflows the deadline",
                    priority.as_str()
                ))
            })
    }

    /// Classifies a stored status string. Unknown strings count as open.
    pub fn assess(
        &self,
        sla_due_at: Option<DateTime<Utc>>,
        status: &str,
        now: DateTime<Utc>,
    ) -> SlaAssessment {
        let terminal = RequestStatus::parse(status).is_some_and(|status| status.is_terminal());
        self.classify(sla_due_at, terminal, now)
    }

    pub fn assess_status(
        &self,
        sla_due_at: Option<DateTime<Utc>>,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> SlaAssessment {
        self.classify(sla_due_at, status.is_terminal(), now)
    }

    pub fn assess_with_clock<C>(
        &self,
        sla_due_at: Option<DateTime<Utc>>,
        status: &str,
        clock: &C,
    ) -> SlaAssessment
    where
        C: Clock + ?Sized,
    {
        self.assess(sla_due_at, status, clock.now())
    }

    fn classify(
        &self,
        sla_due_at: Option<DateTime<Utc>>,
        terminal: bool,
        now: DateTime<Utc>,
    ) -> SlaAssessment {
        if terminal {
            return SlaAssessment::completed();
        }

        let Some(due_at) = sla_due_at else {
            return SlaAssessment { class: SlaClass::OnTrack, remaining_minutes: None, label: None };
        };

        let delta = due_at - now;
        if delta < Duration::zero() {
            return SlaAssessment::with_duration(SlaClass::Overdue, -delta);
        }

        if delta < self.due_soon {
            return SlaAssessment::with_duration(SlaClass::DueSoon, delta);
        }

        SlaAssessment::with_duration(SlaClass::OnTrack, delta)
    }
}

/// Classifies with the default six-hour due-soon threshold.
pub fn derive_sla(
    sla_due_at: Option<DateTime<Utc>>,
    status: &str,
    now: DateTime<Utc>,
) -> SlaAssessment {
    SlaPolicy::default().assess(sla_due_at, status, now)
}

fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes();
    if minutes < 60 {
        return format!("{minutes} دقيقة");
    }

    let hours = duration.num_hours();
    if hours <= 24 {
        return format!("{hours} ساعة");
    }

    format!("{} يوم", duration.num_days())
}
