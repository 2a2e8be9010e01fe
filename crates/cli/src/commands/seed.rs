use chrono::Utc;
use waqf_db::{migrations, SeedResult, WaqfSeedDataset};

use crate::commands::{
    build_runtime, load_config, open_pool, CommandResult, StepError, EXIT_MIGRATION,
};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = WaqfSeedDataset::load(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = WaqfSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_MIGRATION))?;

        let outcome: Result<SeedResult, StepError> = if verification.all_present {
            Ok(seed_result)
        } else {
            Err(("seed_verification", verification_message(&verification.checks), EXIT_MIGRATION))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(step) => CommandResult::from_step("seed", step),
    }
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

fn summary(seeded: &SeedResult) -> String {
    let request_lines = seeded
        .requests_seeded
        .iter()
        .map(|request| {
            format!("  - {}: {} ({})", request.request_id, request.status, request.expected_class)
        })
        .collect::<Vec<_>>();
    format!(
        "seeded {} beneficiaries, {} workflows, {} requests and one pending payment approval:\n{}",
        seeded.beneficiaries_seeded,
        seeded.workflows_seeded,
        seeded.requests_seeded.len(),
        request_lines.join("\n")
    )
}
