use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use clientbridge_core::Flag;
use clientbridge_store::{CustomerRepository, SqliteCustomerStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clientbridge", about = "ClientBridge customer administration CLI")]
struct Cli {
    /// Path to the customer database.
    #[arg(long, default_value = "/var/lib/clientbridge/customers.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List customers at a location
    List {
        /// Location to list
        #[arg(short, long)]
        location: i64,
        /// Emit full JSON records instead of a summary table
        #[arg(long)]
        json: bool,
    },
    /// Set a customer's attention flag
    Flag {
        /// Customer ID
        id: String,
        /// One of: red, yellow, green, none
        flag: String,
    },
    /// Remove a customer (their next visit enrolls a fresh record)
    Remove {
        /// Customer ID to remove
        id: String,
    },
    /// Show a single customer record
    Show {
        /// Customer ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = SqliteCustomerStore::open(&cli.db).await?;

    match cli.command {
        Commands::List { location, json } => {
            let customers = store.list_by_location(location).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&customers)?);
            } else {
                println!("{} customer(s) at location {location}", customers.len());
                for c in customers {
                    println!(
                        "  {}  visits={:<4} flag={:<6} last_seen={}  {}",
                        c.id,
                        c.visit_count,
                        c.flag.as_str(),
                        c.last_seen.to_rfc3339(),
                        c.name.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Commands::Flag { id, flag } => {
            let Some(flag) = Flag::parse(&flag) else {
                bail!("invalid flag {flag:?}; expected one of red, yellow, green, none");
            };
            store.set_flag(&id, flag).await?;
            println!("flag set to {} for {id}", flag.as_str());
        }
        Commands::Remove { id } => {
            store.delete(&id).await?;
            println!("removed {id}");
        }
        Commands::Show { id } => match store.get(&id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("customer {id} not found"),
        },
    }

    Ok(())
}
