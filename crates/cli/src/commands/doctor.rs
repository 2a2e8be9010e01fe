use serde::Serialize;
use waqf_core::config::{AppConfig, LoadOptions};
use waqf_db::{connect_with_config, migrations};

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_DB, EXIT_MIGRATION, EXIT_RUNTIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
    #[serde(skip)]
    exit_code: u8,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into(), exit_code: 0 }
    }

    fn fail(name: &'static str, details: impl Into<String>, exit_code: u8) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into(), exit_code }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because an earlier check failed".to_string(),
            exit_code: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
        let (overall_status, summary) = if failed {
            (CheckStatus::Fail, "doctor: one or more readiness checks failed")
        } else {
            (CheckStatus::Pass, "doctor: all readiness checks passed")
        };
        Self { overall_status, summary: summary.to_string(), checks }
    }

    fn exit_code(&self) -> u8 {
        self.checks
            .iter()
            .find(|check| check.status == CheckStatus::Fail)
            .map_or(0, |check| check.exit_code)
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = DoctorReport::from_checks(collect_checks());
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn collect_checks() -> Vec<DoctorCheck> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return vec![
                DoctorCheck::fail("config_validation", error.to_string(), EXIT_CONFIG),
                DoctorCheck::skipped("api_token"),
                DoctorCheck::skipped("database_connectivity"),
                DoctorCheck::skipped("migrations"),
            ];
        }
    };

    let mut checks = vec![
        DoctorCheck::pass("config_validation", "configuration loaded and validated"),
        check_api_token(&config),
    ];
    checks.extend(check_database(&config));
    checks
}

fn check_api_token(config: &AppConfig) -> DoctorCheck {
    if config.server.requires_token() {
        DoctorCheck::pass("api_token", "bearer token configured for API routes")
    } else {
        DoctorCheck {
            name: "api_token",
            status: CheckStatus::Warn,
            details: "server.api_token is unset; API routes accept unauthenticated calls"
                .to_string(),
            exit_code: 0,
        }
    }
}

fn check_database(config: &AppConfig) -> [DoctorCheck; 2] {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return [
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                    EXIT_RUNTIME,
                ),
                DoctorCheck::skipped("migrations"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return [
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                        EXIT_DB,
                    ),
                    DoctorCheck::skipped("migrations"),
                ];
            }
        };

        let connectivity = DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        );
        let bundled = migrations::bundled_count();
        let migration_check = match migrations::applied_versions(&pool).await {
            Ok(applied) if applied.len() >= bundled => DoctorCheck::pass(
                "migrations",
                format!("{} of {bundled} migrations applied", applied.len()),
            ),
            Ok(applied) => DoctorCheck::fail(
                "migrations",
                format!("{} of {bundled} migrations applied; run `waqf migrate`", applied.len()),
                EXIT_MIGRATION,
            ),
            Err(error) => DoctorCheck::fail(
                "migrations",
                format!("migration history unavailable: {error}"),
                EXIT_MIGRATION,
            ),
        };

        pool.close().await;
        [connectivity, migration_check]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
