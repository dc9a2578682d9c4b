use activity_sync_core::{
    parse_date, Activity, DateGroup, HttpRemoteService, Navigator, SyncStore, TracingIntents,
};
use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;

use super::OutputFormat;
use crate::config::Config;

/// Request tag for deletes started from the command line.
const DELETE_TAG: &str = "cli";

#[derive(Args)]
pub struct ActivityCommand {
    #[command(subcommand)]
    pub command: ActivitySubcommand,
}

#[derive(Subcommand)]
pub enum ActivitySubcommand {
    /// List all activities grouped by day
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show an activity's details
    Show {
        /// Activity ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a new activity
    Create {
        /// Title of the activity
        #[arg(long)]
        title: String,

        /// When it happens (e.g. 2021-01-02T10:00)
        #[arg(long)]
        date: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        venue: Option<String>,
    },

    /// Update an existing activity
    Update {
        /// Activity ID
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New date
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        venue: Option<String>,
    },

    /// Delete an activity
    Delete {
        /// Activity ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Points the user at the saved record.
struct ShowHint;

impl Navigator for ShowHint {
    fn navigate_to_record(&self, id: &str) {
        println!("\nView it with: act activity show {}", id);
    }
}

pub fn build_store(config: &Config) -> SyncStore<HttpRemoteService> {
    let mut remote: HttpRemoteService = HttpRemoteService::new(&config.api_url.value);
    if let Some(token) = &config.auth.token {
        remote = remote.with_token(token.clone());
    }

    SyncStore::new(remote)
        .with_config(config.store_config())
        .with_notifier(Arc::new(TracingIntents))
        .with_navigator(Arc::new(ShowHint))
}

impl ActivityCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let store = build_store(config);

        match &self.command {
            ActivitySubcommand::List { format } => {
                let count = store.load_all().await?;
                tracing::debug!("loaded {} activities", count);

                let groups = store.grouped_by_date();
                if groups.is_empty() {
                    println!("No activities found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(groups.as_slice())?);
                    }
                    OutputFormat::Text => {
                        print_groups(&groups);
                        println!("\nTotal: {} activit(ies)", store.values().len());
                    }
                }
                Ok(())
            }

            ActivitySubcommand::Show { id, format } => {
                let activity = store.load_one(id).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&activity)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", activity);
                    }
                }
                Ok(())
            }

            ActivitySubcommand::Create {
                title,
                date,
                description,
                category,
                city,
                venue,
            } => {
                if title.trim().is_empty() {
                    return Err("Activity title cannot be empty".into());
                }
                let date = parse_date(date).map_err(|e| format!("Invalid date '{}': {}", date, e))?;

                let mut activity = Activity::new(title.trim(), date);
                if let Some(description) = description {
                    activity = activity.with_description(description);
                }
                if let Some(category) = category {
                    activity = activity.with_category(category);
                }
                if let Some(city) = city {
                    activity = activity.with_city(city);
                }
                if let Some(venue) = venue {
                    activity = activity.with_venue(venue);
                }

                store.open_create_form();
                let created = store.create(activity).await?;
                println!("Created activity:");
                print!("{}", created);
                Ok(())
            }

            ActivitySubcommand::Update {
                id,
                title,
                date,
                description,
                category,
                city,
                venue,
            } => {
                let has_updates = title.is_some()
                    || date.is_some()
                    || description.is_some()
                    || category.is_some()
                    || city.is_some()
                    || venue.is_some();

                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                store.load_one(id).await?;
                let mut activity = store
                    .open_edit_form(id)
                    .ok_or_else(|| format!("Activity not found: {}", id))?;

                if let Some(new_title) = title {
                    if new_title.trim().is_empty() {
                        return Err("Activity title cannot be empty".into());
                    }
                    activity.title = new_title.trim().to_string();
                }
                if let Some(new_date) = date {
                    activity.date = parse_date(new_date)
                        .map_err(|e| format!("Invalid date '{}': {}", new_date, e))?;
                }
                if let Some(new_description) = description {
                    activity.description = new_description.clone();
                }
                if let Some(new_category) = category {
                    activity.category = new_category.clone();
                }
                if let Some(new_city) = city {
                    activity.city = new_city.clone();
                }
                if let Some(new_venue) = venue {
                    activity.venue = new_venue.clone();
                }

                let updated = store.update(activity).await?;
                println!("Updated activity:");
                print!("{}", updated);
                Ok(())
            }

            ActivitySubcommand::Delete { id, force } => {
                let activity = store.load_one(id).await?;

                if !force {
                    print!("Delete activity '{}'? [y/N] ", activity.title);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                store.delete(id, DELETE_TAG).await?;
                println!("Deleted activity: {}", activity.title);
                Ok(())
            }
        }
    }
}

fn print_groups(groups: &[DateGroup<Activity>]) {
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", group.date);
        println!("{}", "-".repeat(80));
        for activity in &group.records {
            println!(
                "  {}  {:<30}  {:<12}  {}",
                activity.date.format("%H:%M"),
                truncate(&activity.title, 30),
                truncate(&activity.category, 12),
                activity.id
            );
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
