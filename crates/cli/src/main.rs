//! Partyrent CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations (schema + session table)
//! pr-cli migrate
//!
//! # Create an admin account (password from PARTYRENT_ADMIN_PASSWORD)
//! pr-cli admin create -p "+15551234567" -f Ada -l Lovelace
//!
//! # Promote an existing account to admin
//! pr-cli admin promote -p "+15551234567"
//!
//! # Seed the catalog from a YAML file
//! pr-cli seed catalog.yaml
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pr-cli")]
#[command(author, version, about = "Partyrent CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the catalog from a YAML file
    Seed {
        /// Path to the seed file
        file: String,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin account
    Create {
        /// Phone number (login identifier)
        #[arg(short, long)]
        phone: String,

        /// First name
        #[arg(short, long)]
        first_name: String,

        /// Last name
        #[arg(short, long)]
        last_name: String,

        /// Optional email address
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Grant the admin role to an existing account
    Promote {
        /// Phone number of the account
        #[arg(short, long)]
        phone: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                phone,
                first_name,
                last_name,
                email,
            } => {
                commands::admin::create_user(&phone, &first_name, &last_name, email.as_deref())
                    .await?;
            }
            AdminAction::Promote { phone } => commands::admin::promote(&phone).await?,
        },
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
    }
    Ok(())
}
