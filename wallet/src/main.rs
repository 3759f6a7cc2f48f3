//! Cloak Wallet CLI
//!
//! A thin command-line surface over the wallet facade.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use cloak_wallet::{
    builder::ATOMIC_UNITS_PER_COIN, config::Config, ring::MemoryDecoyPool, types::SessionType,
    CancelFlag, HttpNodeClient, WalletFacade,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cloak-wallet")]
#[command(about = "Cloak confidential wallet")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Wallet id (defaults to the only wallet in the data dir)
    #[arg(short, long, global = true)]
    wallet: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet
    Init {
        /// Restore from an existing mnemonic instead of generating one
        #[arg(long)]
        recover: bool,
    },

    /// Generate a mnemonic without creating a wallet
    Mnemonic {
        /// Word count (12, 15, 18, 21 or 24)
        #[arg(long, default_value = "24")]
        words: usize,

        /// Wordlist language
        #[arg(long, default_value = "english")]
        language: String,
    },

    /// List wallets in the data directory
    Wallets,

    /// Show the wallet's stealth addresses
    Address,

    /// Show the spendable balance
    Balance,

    /// Show transaction history
    History,

    /// Receive the outputs paid under a payment id
    Receive {
        /// Payment id announced by the sender
        payment_id: String,
    },

    /// Send coins to a stealth address
    Send {
        /// Recipient stealth address
        address: String,

        /// Amount in coins
        amount: f64,

        /// Attach a memo for the recipient
        #[arg(long, default_value = "")]
        memo: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load(cli.config.as_deref().map(std::path::Path::new))?;
    let data_dir = config.data_dir();

    match cli.command {
        Commands::Init { recover } => {
            let mnemonic = if recover {
                rpassword::prompt_password("Enter mnemonic: ")?
            } else {
                let phrase = cloak_wallet::create_mnemonic("english", 24)?;
                println!("Write down your recovery phrase:\n\n  {phrase}\n");
                phrase
            };
            let passphrase = rpassword::prompt_password("Choose a passphrase: ")?;
            let confirm = rpassword::prompt_password("Confirm passphrase: ")?;
            if passphrase != confirm {
                return Err(anyhow!("passphrases do not match"));
            }

            let id =
                cloak_wallet::create_wallet(&data_dir, &mnemonic, &passphrase, config.network)?;
            println!("Wallet created: {id}");
            Ok(())
        }

        Commands::Mnemonic { words, language } => {
            println!("{}", cloak_wallet::create_mnemonic(&language, words)?);
            Ok(())
        }

        Commands::Wallets => {
            for id in cloak_wallet::wallet_list(&data_dir)? {
                println!("{id}");
            }
            Ok(())
        }

        Commands::Address => {
            let wallet = open_wallet(&cli.wallet, &config)?;
            for address in wallet.addresses()? {
                println!("{address}");
            }
            Ok(())
        }

        Commands::Balance => {
            let wallet = open_wallet(&cli.wallet, &config)?;
            println!("{}", format_amount(wallet.available_balance()?));
            Ok(())
        }

        Commands::History => {
            let wallet = open_wallet(&cli.wallet, &config)?;
            for row in wallet.history()? {
                println!(
                    "{}  in {:>18}  out {:>18}  balance {:>18}  {}",
                    row.date_time.format("%Y-%m-%d %H:%M:%S"),
                    format_amount(row.money_in),
                    format_amount(row.money_out),
                    format_amount(row.balance),
                    row.memo
                );
            }
            Ok(())
        }

        Commands::Receive { payment_id } => {
            let wallet = open_wallet(&cli.wallet, &config)?;
            let session = wallet.open_session(SessionType::Coin);
            let record = wallet.receive_payment(session.session_id, &payment_id).await?;
            println!(
                "Received {} across {} output(s)",
                format_amount(record.balance),
                record.vout.len()
            );
            Ok(())
        }

        Commands::Send {
            address,
            amount,
            memo,
        } => {
            if amount <= 0.0 {
                return Err(anyhow!("amount must be positive"));
            }
            let atomic = (amount * ATOMIC_UNITS_PER_COIN as f64) as u64;

            let wallet = open_wallet(&cli.wallet, &config)?;
            let session = wallet.open_session(SessionType::Coin);
            wallet.stage_payment(session.session_id, &address, atomic, &memo)?;

            let tx = wallet.create_payment(session.session_id).await?;
            println!("Built transaction {}", hex::encode(tx.txn_id));

            let txn_id = wallet.send(session.session_id).await?;
            println!("Sent: {}", hex::encode(txn_id));
            Ok(())
        }
    }
}

/// Open the chosen (or only) wallet behind a facade.
fn open_wallet(
    wallet_id: &Option<String>,
    config: &Config,
) -> Result<WalletFacade<HttpNodeClient, MemoryDecoyPool>> {
    let data_dir = config.data_dir();
    let id = match wallet_id {
        Some(id) => id.clone(),
        None => {
            let mut wallets = cloak_wallet::wallet_list(&data_dir)?;
            match wallets.len() {
                0 => return Err(anyhow!("no wallet found; run 'cloak-wallet init' first")),
                1 => wallets.remove(0),
                _ => return Err(anyhow!("several wallets found; pass --wallet <id>")),
            }
        }
    };

    let passphrase = rpassword::prompt_password("Enter wallet passphrase: ")?;
    let store = cloak_wallet::open_store(&data_dir, &id, &passphrase)?;

    let cancel = CancelFlag::new();
    let node = HttpNodeClient::new(&config.node_endpoint, cancel.clone())?;

    // Seed the decoy pool from the wallet's own transaction history; a
    // production deployment replaces this with the network safeguard feed.
    let pool = Arc::new(MemoryDecoyPool::with_transactions(
        store.query::<cloak_wallet::Transaction>()?,
    ));

    Ok(WalletFacade::new(store, node, pool, config.network, cancel))
}

/// Format atomic units as coins.
fn format_amount(atomic: u64) -> String {
    format!(
        "{}.{:09}",
        atomic / ATOMIC_UNITS_PER_COIN,
        atomic % ATOMIC_UNITS_PER_COIN
    )
}
