//! Provider configuration repository against `PostgreSQL`.

use super::helpers::temporary_database;
use chrono::Duration;
use foreman::provider::{
    SecretId,
    adapters::postgres::PostgresProviderConfigRepository,
    domain::{AiProvider, AiProviderConfig, ProjectAiSettings, ProviderDeployment},
    ports::ProviderConfigRepository,
};
use foreman::task::domain::ProjectId;
use mockable::DefaultClock;
use rstest::rstest;

fn azure_config(project_id: ProjectId, model: &str) -> Result<AiProviderConfig, eyre::Report> {
    Ok(AiProviderConfig::new(
        project_id,
        AiProvider::OpenAi,
        ProviderDeployment::Azure {
            api_key_secret: SecretId::new("azure-key")?,
            endpoint: "https://acme.openai.azure.com".to_owned(),
            deployment: "gpt-prod".to_owned(),
            api_version: "2024-06-01".to_owned(),
        },
        model,
        foreman::clock::now(&DefaultClock),
    )?
    .with_sampling(2048, 0.5)
    .with_header("x-team", "platform"))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn config_upsert_replaces_the_project_provider_pair() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let configs = PostgresProviderConfigRepository::new(db.pool());
    let project_id = ProjectId::new();
    let first = azure_config(project_id, "gpt-4o")?;
    configs.upsert_config(&first).await?;

    let mut second = azure_config(project_id, "gpt-4.1")?;
    second.updated_at = first.updated_at + Duration::seconds(1);
    configs.upsert_config(&second).await?;

    let stored = configs.find_config(project_id, AiProvider::OpenAi).await?;
    eyre::ensure!(stored.as_ref() == Some(&second), "stored config is {stored:?}");
    let other = configs.find_config(project_id, AiProvider::Anthropic).await?;
    eyre::ensure!(other.is_none(), "unconfigured provider returned {other:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stage_selection_round_trips_and_can_be_cleared() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let configs = PostgresProviderConfigRepository::new(db.pool());
    let project_id = ProjectId::new();
    eyre::ensure!(
        configs.find_settings(project_id).await?.is_none(),
        "settings exist before any write"
    );

    let mut settings = ProjectAiSettings::new(project_id);
    settings.evaluation_provider = Some(AiProvider::Anthropic);
    settings.implementation_provider = Some(AiProvider::OpenAi);
    configs.upsert_settings(&settings).await?;
    settings.implementation_provider = None;
    configs.upsert_settings(&settings).await?;

    let stored = configs.find_settings(project_id).await?;
    eyre::ensure!(stored.as_ref() == Some(&settings), "stored settings are {stored:?}");
    Ok(())
}
