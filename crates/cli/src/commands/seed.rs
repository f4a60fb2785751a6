use chrono::Utc;

use crate::commands::CommandResult;
use wayfarer_core::config::{AppConfig, LoadOptions};
use wayfarer_db::repositories::SqlCatalogRepository;
use wayfarer_db::{connect_with_settings, migrations, seed_stub_hotels};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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
                "seed",
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

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let catalog = SqlCatalogRepository::new(pool.clone());
        let seeded = seed_stub_hotels(&catalog, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<usize, (&'static str, String, u8)>(seeded.hotels_inserted)
    });

    match result {
        Ok(hotels_inserted) => CommandResult::success(
            "seed",
            format!("loaded static hotel catalog ({hotels_inserted} hotels)"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
