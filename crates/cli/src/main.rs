//! fads CLI - route checks, session and guest cart tools.
//!
//! # Usage
//!
//! ```bash
//! # Where would a customer opening /admin end up?
//! fads route /admin/products --as customer
//!
//! # Who does the session service think we are?
//! fads whoami
//!
//! # Work on the local guest cart
//! fads cart add SKU-1 --size M --quantity 2 --price 19.99
//! fads cart show
//!
//! # Sign in and merge the guest cart into the account's cart
//! FADS_PASSWORD=... fads login --email ada@fads.shop
//! ```
//!
//! Configuration comes from the environment (see `fads_storefront::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand, ValueEnum};
use fads_core::ActorKind;
use fads_storefront::StorefrontConfig;
use fads_storefront::telemetry::{init_sentry, init_tracing};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "fads")]
#[command(author, version, about = "fads storefront client tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route guard decision for a path
    Route {
        /// Path to check, e.g. `/admin/products`
        path: String,

        /// Actor kind to decide for
        #[arg(long = "as", value_enum, default_value_t = KindArg::Guest)]
        kind: KindArg,
    },
    /// Resolve the session and print the actor
    Whoami,
    /// Sign in and merge the guest cart (password from `FADS_PASSWORD`)
    Login {
        #[arg(short, long)]
        email: String,

        /// Sign in through the admin endpoints
        #[arg(long)]
        admin: bool,
    },
    /// Operate on the local guest cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List the lines and the total
    Show,
    /// Add a product variant
    Add {
        product_id: String,

        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        color: Option<String>,

        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,

        /// Unit price, e.g. `19.99`
        #[arg(short, long)]
        price: String,
    },
    /// Set a line's quantity (0 removes it)
    Update {
        line_key: String,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove { line_key: String },
    /// Remove every line
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Guest,
    Customer,
    Admin,
}

impl From<KindArg> for ActorKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Guest => Self::Guest,
            KindArg::Customer => Self::Customer,
            KindArg::Admin => Self::Admin,
        }
    }
}

#[tokio::main]
async fn main() {
    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config.sentry);
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CliError> {
    match cli.command {
        Commands::Route { path, kind } => commands::route::decide(&path, kind.into()),
        Commands::Whoami => commands::session::whoami(&config).await?,
        Commands::Login { email, admin } => commands::session::login(&config, &email, admin).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&config)?,
            CartAction::Add {
                product_id,
                size,
                color,
                quantity,
                price,
            } => commands::cart::add(
                &config,
                &product_id,
                size.as_deref(),
                color.as_deref(),
                quantity,
                &price,
            )?,
            CartAction::Update { line_key, quantity } => {
                commands::cart::update(&config, &line_key, quantity)?;
            }
            CartAction::Remove { line_key } => commands::cart::remove(&config, &line_key)?,
            CartAction::Clear => commands::cart::clear(&config)?,
        },
    }
    Ok(())
}
