use crate::commands::{
    build_runtime, load_config, open_pool, CommandResult, StepError, EXIT_MIGRATION,
};
use waqf_db::migrations;

/// Preflight for `waqf-server`: the same config, connection and migration steps the
/// server bootstrap runs, without binding the listener.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("start") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<(), StepError>(())
    });

    match result {
        Ok(()) => {
            let auth = if config.server.requires_token() {
                "bearer token required for API routes"
            } else {
                "API routes open (no server.api_token configured)"
            };
            CommandResult::success(
                "start",
                format!(
                    "preflight passed; waqf-server would listen on {} ({auth})",
                    config.server.listen_address()
                ),
            )
        }
        Err(step) => CommandResult::from_step("start", step),
    }
}
