//! Pup CLI - command-line client for the Puppy Planner data layer
//!
//! Tracks dogs, activities, health records, and vaccinations against the
//! offline-first core; every command works without a network connection.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "pup")]
#[command(about = "Track your dog's activities, health records, and vaccinations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage dogs
    Dog {
        #[command(subcommand)]
        command: DogCommands,
    },
    /// Manage activities
    Activity {
        #[command(subcommand)]
        command: ActivityCommands,
    },
    /// Manage health records
    Health {
        #[command(subcommand)]
        command: HealthCommands,
    },
    /// Manage vaccinations
    Vaccination {
        #[command(subcommand)]
        command: VaccinationCommands,
    },
    /// Push queued changes and pull the latest remote state
    Sync,
    /// Show connectivity and queue status
    Status,
    /// Inspect the pending sync queue
    Queue {
        /// Show dead-lettered operations instead
        #[arg(long)]
        dead: bool,
    },
}

#[derive(Subcommand)]
enum DogCommands {
    /// Add a dog
    Add {
        /// Dog's name
        #[arg(long)]
        name: String,
        /// Breed
        #[arg(long)]
        breed: Option<String>,
        /// Weight in kilograms
        #[arg(long)]
        weight: Option<f64>,
    },
    /// List your dogs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ActivityCommands {
    /// Record an activity
    Add {
        /// Dog id
        #[arg(long)]
        dog: String,
        /// Kind of activity (walk, play, training, ...)
        #[arg(long = "type", value_name = "TYPE")]
        record_type: String,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List activities, newest first
    List {
        /// Only this dog's activities
        #[arg(long)]
        dog: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HealthCommands {
    /// Record a health event
    Add {
        /// Dog id
        #[arg(long)]
        dog: String,
        /// Kind of record (checkup, injury, medication, ...)
        #[arg(long = "type", value_name = "TYPE")]
        record_type: String,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List health records, newest first
    List {
        /// Only this dog's records
        #[arg(long)]
        dog: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum VaccinationCommands {
    /// Record a vaccination
    Add {
        /// Dog id
        #[arg(long)]
        dog: String,
        /// Vaccine name
        #[arg(long)]
        vaccine: String,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// List vaccinations, newest first
    List {
        /// Only this dog's vaccinations
        #[arg(long)]
        dog: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pup=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db_path;

    match cli.command {
        Commands::Dog { command } => match command {
            DogCommands::Add {
                name,
                breed,
                weight,
            } => commands::dog::run_add(&name, breed.as_deref(), weight, db_path).await?,
            DogCommands::List { json } => commands::dog::run_list(json, db_path).await?,
        },
        Commands::Activity { command } => match command {
            ActivityCommands::Add {
                dog,
                record_type,
                date,
                notes,
            } => {
                commands::activity::run_add(
                    &dog,
                    &record_type,
                    date.as_deref(),
                    notes.as_deref(),
                    db_path,
                )
                .await?;
            }
            ActivityCommands::List { dog, json } => {
                commands::activity::run_list(dog.as_deref(), json, db_path).await?;
            }
        },
        Commands::Health { command } => match command {
            HealthCommands::Add {
                dog,
                record_type,
                date,
                notes,
            } => {
                commands::health::run_add(
                    &dog,
                    &record_type,
                    date.as_deref(),
                    notes.as_deref(),
                    db_path,
                )
                .await?;
            }
            HealthCommands::List { dog, json } => {
                commands::health::run_list(dog.as_deref(), json, db_path).await?;
            }
        },
        Commands::Vaccination { command } => match command {
            VaccinationCommands::Add { dog, vaccine, date } => {
                commands::vaccination::run_add(&dog, &vaccine, date.as_deref(), db_path).await?;
            }
            VaccinationCommands::List { dog, json } => {
                commands::vaccination::run_list(dog.as_deref(), json, db_path).await?;
            }
        },
        Commands::Sync => commands::sync::run_sync(db_path).await?,
        Commands::Status => commands::sync::run_status(db_path).await?,
        Commands::Queue { dead } => commands::sync::run_queue(dead, db_path).await?,
    }

    Ok(())
}
