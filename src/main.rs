//! Bucketmeta server binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucketmeta::api::MetadataApi;
use bucketmeta::config::{AppConfig, LogFormat, Role};
use bucketmeta::master::{Master, USERS_BUCKET};
use bucketmeta::types::{BucketInfo, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bucketmeta={}", config.logging.level).into());
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    match config.role {
        Role::Master => {
            let master = Master::start(
                &config.metadata_path(),
                &config.endpoint(),
                &SystemClock,
            )
            .await?;

            master
                .serve(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("shutting down");
                })
                .await?;
        }
        Role::Worker => {
            // Smoke session: connect, verify the well-known bucket, idle.
            let api = MetadataApi::connect(&config.metadata_path(), &config.endpoint()).await?;

            let attrs = api.get_bucket_attributes(USERS_BUCKET).await?;
            let info = BucketInfo::from_bytes(&attrs)?;
            let namespaces = api
                .client()
                .manifest()
                .map(|m| m.namespaces.len())
                .unwrap_or(0);
            tracing::info!(
                owner = %info.owner,
                namespaces,
                "worker session ready"
            );

            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
