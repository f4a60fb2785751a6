use std::sync::Arc;

use chrono::Utc;

use crate::commands::CommandResult;
use wayfarer_agent::{build_snapshot, CacheCounters, SpendCapGuard};
use wayfarer_core::config::{AppConfig, LoadOptions};
use wayfarer_db::connect_with_settings;
use wayfarer_db::repositories::{LedgerRepository, SqlLedgerRepository};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "status",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "status",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let ledger: Arc<dyn LedgerRepository> = Arc::new(SqlLedgerRepository::new(pool.clone()));
        let guard = SpendCapGuard::new(ledger.clone(), config.spend.monthly_cap_usd);
        // Counters are process-local, so a one-shot command always reports a
        // cold cache. The running service reports live numbers here.
        let counters = Arc::new(CacheCounters::default());

        let snapshot = build_snapshot(&guard, &ledger, &counters, Utc::now())
            .await
            .map_err(|error| ("snapshot", error.to_string(), 5u8))?;

        pool.close().await;

        serde_json::to_string_pretty(&snapshot)
            .map_err(|error| ("serialization", error.to_string(), 6u8))
    });

    match result {
        Ok(rendered) => CommandResult { exit_code: 0, output: rendered },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("status", error_class, message, exit_code)
        }
    }
}
