//! `sfcc-job rules` - Output transformation rule management

use super::print_items;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use common::config::Settings;
use common::models::SavedTransformation;
use common::store::{transformation_store, Store};
use regex::Regex;

#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// List output rules
    List,
    /// Save a rule, replacing any rule with the same id
    Add {
        /// Rule id; generated when omitted
        id: Option<String>,
        /// Regular expression matched against each console line
        #[arg(long)]
        pattern: String,
        /// Replacement text, may reference capture groups as $1
        #[arg(long)]
        replacement: String,
        /// Application order, lowest first
        #[arg(long, default_value_t = 0)]
        position: i64,
        /// Save the rule without applying it
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a rule
    Remove {
        /// Rule id
        id: String,
    },
}

pub async fn handle(args: RulesArgs, settings: &Settings) -> Result<()> {
    let store = transformation_store(&settings.store.directory);

    match args.command {
        RulesCommand::List => {
            print_items(&store, "No output rules", |rule: &SavedTransformation| {
                format!(
                    "{:<36} {} /{}/ -> {:?} position={}",
                    rule.id,
                    if rule.enabled { "enabled " } else { "disabled" },
                    rule.pattern,
                    rule.replacement,
                    rule.position
                )
            })
            .await?;
        }
        RulesCommand::Add {
            id,
            pattern,
            replacement,
            position,
            disabled,
        } => {
            Regex::new(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))?;

            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            store
                .add_item(SavedTransformation {
                    id: id.clone(),
                    pattern,
                    replacement,
                    position,
                    enabled: !disabled,
                })
                .await?;
            println!("Saved rule {}", id);
        }
        RulesCommand::Remove { id } => {
            if store.remove_item(&id).await? {
                println!("Removed rule {}", id);
            } else {
                println!("No output rules");
            }
        }
    }

    Ok(())
}
