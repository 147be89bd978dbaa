//! BetterBlocker CLI
//!
//! CLI tool for reverse filter lookups against local filter lists.

mod lookup;

use clap::{Parser, Subcommand};

use lookup::{run_domain, run_lookup, DomainOptions, LookupOptions};

#[derive(Parser)]
#[command(name = "bb-cli")]
#[command(about = "BetterBlocker filter list tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the filter lists that contain a filter
    Lookup {
        /// Filter list files, as PATH or PATH=TITLE
        #[arg(short, long)]
        list: Vec<String>,

        /// File holding the user's own filters
        #[arg(short, long)]
        user_filters: Option<String>,

        /// Raw filter to look up
        #[arg(short, long)]
        filter: String,

        /// Compiled form of a network filter (defaults to the raw filter)
        #[arg(long)]
        compiled: Option<String>,

        /// Treat the filter as cosmetic, seen on this hostname
        #[arg(long)]
        cosmetic: Option<String>,

        /// Public Suffix List file for domain resolution
        #[arg(long)]
        psl: Option<String>,

        /// JSON config file
        #[arg(short, long)]
        config: Option<String>,

        /// Idle seconds before the worker is recycled
        #[arg(long)]
        idle_ttl: Option<u64>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the registrable domain of hostnames
    Domain {
        /// Hostnames to resolve
        #[arg(required = true)]
        hostname: Vec<String>,

        /// Public Suffix List file
        #[arg(long)]
        psl: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Lookup {
            list,
            user_filters,
            filter,
            compiled,
            cosmetic,
            psl,
            config,
            idle_ttl,
            json,
        } => run_lookup(LookupOptions {
            lists: list,
            user_filters,
            filter,
            compiled,
            cosmetic,
            psl,
            config,
            idle_ttl_secs: idle_ttl,
            json,
        }),
        Commands::Domain { hostname, psl } => run_domain(DomainOptions {
            hostnames: hostname,
            psl,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
