use crate::cli::commands::{Cli, Commands};
use memoria::memory::{ReconciliationEngine, create_engine};
use memoria::{Config, Error, MemoryError, Result};
use serde::Serialize;
use std::time::Duration;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{text}");
    Ok(())
}

async fn target_owners(engine: &ReconciliationEngine, owner: Option<String>) -> Result<Vec<String>> {
    match owner {
        Some(owner) => Ok(vec![owner]),
        None => Ok(engine.owners().await?),
    }
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let engine = create_engine(&config).await?;

    match cli.command {
        Commands::Reconcile {
            owner,
            source,
            deadline_ms,
            utterance,
        } => {
            let source = source.unwrap_or_else(|| format!("utterance:{}", uuid::Uuid::new_v4()));
            let deadline =
                deadline_ms.map_or(engine.settings().deadline, Duration::from_millis);
            match engine
                .reconcile_with_deadline(&owner, &utterance, &source, deadline)
                .await
            {
                Ok(changes) => print_json(&changes),
                Err(err) => {
                    if let Some(partial) = err.partial_change_set() {
                        print_json(partial)?;
                    }
                    Err(Error::Memory(err))
                }
            }
        }
        Commands::Query {
            owner,
            limit,
            text,
        } => print_json(&engine.query(&owner, &text, limit).await?),
        Commands::List { owner } => print_json(&engine.list_active(&owner).await?),
        Commands::Forget { owner, all, id } => {
            if all {
                return print_json(&engine.forget_all(&owner).await?);
            }
            let id = id.ok_or_else(|| {
                MemoryError::InvalidInput("a memory id or --all is required".into())
            })?;
            print_json(&engine.forget(&owner, &id).await?)
        }
        Commands::Check { owner } => {
            let mut reports = Vec::new();
            for owner in target_owners(&engine, owner).await? {
                reports.push(engine.check(&owner).await?);
            }
            print_json(&reports)
        }
        Commands::Repair { owner } => {
            let mut reports = Vec::new();
            for owner in target_owners(&engine, owner).await? {
                reports.push(engine.repair(&owner).await?);
            }
            print_json(&reports)
        }
    }
}
