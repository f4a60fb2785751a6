use crate::commands::CommandResult;
use wayfarer_core::config::{AppConfig, LoadOptions};
use wayfarer_core::domain::usage::MonthKey;
use wayfarer_db::connect_with_settings;
use wayfarer_db::repositories::{LedgerRepository, SqlLedgerRepository};

pub fn run(month: &str) -> CommandResult {
    if !is_month_key(month) {
        return CommandResult::failure(
            "reset-month",
            "invalid_argument",
            format!("`{month}` is not a YYYY-MM month bucket"),
            2,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "reset-month",
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
                "reset-month",
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

        let ledger = SqlLedgerRepository::new(pool.clone());
        let deleted = ledger
            .delete_month(&MonthKey(month.to_string()))
            .await
            .map_err(|error| ("ledger", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<u64, (&'static str, String, u8)>(deleted)
    });

    match result {
        Ok(deleted) => CommandResult::success(
            "reset-month",
            format!("deleted {deleted} usage records for {month}"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("reset-month", error_class, message, exit_code)
        }
    }
}

fn is_month_key(value: &str) -> bool {
    let Some((year, month)) = value.split_once('-') else { return false };
    year.len() == 4
        && year.bytes().all(|byte| byte.is_ascii_digit())
        && month.len() == 2
        && matches!(month.parse::<u8>(), Ok(1..=12))
}
