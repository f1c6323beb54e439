//! Authie command-line client
//!
//! Drives the passcode-protected OTP vault from a terminal. Every
//! invocation opens the vault directory, unlocks it if a passcode is
//! configured, runs one command and exits.
//!
//! The passcode can come from `--passcode` or `AUTHIE_PASSCODE`. It is
//! never written to disk; only its salt and the encrypted token list are.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use authie_vault::storage::{load_settings, save_settings};
use authie_vault::{
    FileStore, KdfSettings, Token, VaultError, VaultSettings, VaultStatus, VaultStore,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

/// Authie OTP vault
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the vault data and settings
    #[arg(long, env = "AUTHIE_DATA_DIR", default_value = ".authie")]
    data_dir: PathBuf,

    /// Passcode of a protected vault
    #[arg(long, env = "AUTHIE_PASSCODE", hide_env_values = true)]
    passcode: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether a passcode is configured and whether it unlocks
    Status,
    /// List stored tokens in display order
    List {
        /// Include OTP secrets in the output
        #[arg(long)]
        show_secrets: bool,
    },
    /// Append a token
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "#fff")]
        color: String,
        /// OTP seed, usually base32
        #[arg(long, env = "AUTHIE_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Remove the token at a position shown by `list`
    Remove { index: usize },
    /// Check the passcode without unlocking
    Verify,
    /// Protect the vault with a new passcode (re-encrypts everything)
    SetPasscode {
        #[arg(long, env = "AUTHIE_NEW_PASSCODE", hide_env_values = true)]
        new_passcode: String,
    },
    /// Remove the passcode and store tokens unencrypted
    ClearPasscode,
    /// Delete all vault data
    Reset {
        /// Required, there is no way back
        #[arg(long)]
        yes: bool,
    },
    /// Choose the key derivation used for future passcodes
    Config {
        #[arg(long, value_enum)]
        kdf: KdfChoice,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KdfChoice {
    /// Argon2id, 64 MiB, 3 passes
    Argon2id,
    /// PBKDF2-HMAC-SHA256, 100,000 iterations, readable by the web client
    Pbkdf2,
}

impl From<KdfChoice> for KdfSettings {
    fn from(choice: KdfChoice) -> Self {
        match choice {
            KdfChoice::Argon2id => KdfSettings::default(),
            KdfChoice::Pbkdf2 => KdfSettings::web_compatible(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authie_vault=info,authie_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let passcode = args.passcode.clone().map(Zeroizing::new);

    let storage = FileStore::open(&args.data_dir)
        .await
        .with_context(|| format!("Failed to open data directory {:?}", args.data_dir))?;
    let settings = load_settings(&args.data_dir)
        .with_context(|| format!("Failed to load settings from {:?}", args.data_dir))?;
    debug!("Loaded settings: {:?}", settings);

    let mut vault = VaultStore::new(Arc::new(storage), &settings);

    match args.command {
        Command::Status => status(&vault, passcode.as_deref(), args.json).await?,
        Command::Verify => return verify(&vault, passcode.as_deref(), args.json).await,
        Command::Config { kdf } => configure(&vault, &args.data_dir, kdf).await?,
        Command::Reset { yes } => {
            if !yes {
                bail!("Refusing to delete the vault without --yes");
            }
            vault.destroy().await.context("Failed to reset vault")?;
            info!("Vault reset");
        }
        command => {
            open(&mut vault, passcode.as_deref()).await?;
            run_unlocked(&mut vault, command, args.json).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Load the collection, unlocking first when a passcode is configured.
async fn open(vault: &mut VaultStore, passcode: Option<&String>) -> Result<()> {
    if vault.is_passcode_configured().await? {
        let Some(passcode) = passcode else {
            bail!("Vault is locked, supply --passcode or AUTHIE_PASSCODE");
        };
        match vault.unlock(passcode).await {
            Err(VaultError::InvalidPasscode) => bail!("Wrong passcode"),
            other => other.context("Failed to unlock vault")?,
        }
    } else {
        vault.init().await.context("Failed to load vault")?;
    }
    Ok(())
}

async fn run_unlocked(vault: &mut VaultStore, command: Command, as_json: bool) -> Result<()> {
    match command {
        Command::List { show_secrets } => {
            list(vault.tokens(), show_secrets, as_json);
        }
        Command::Add {
            name,
            username,
            color,
            secret,
        } => {
            let secret = Zeroizing::new(secret);
            vault
                .add_token(Token::new(name, username, color, secret.as_str()))
                .await
                .context("Failed to save token")?;
            info!("Added token #{}", vault.tokens().len() - 1);
        }
        Command::Remove { index } => {
            let removed = vault.remove_token(index).await.context("Failed to remove token")?;
            info!("Removed {:?}", removed.name);
        }
        Command::SetPasscode { new_passcode } => {
            let new_passcode = Zeroizing::new(new_passcode);
            if new_passcode.is_empty() {
                bail!("New passcode must not be empty, use clear-passcode instead");
            }
            vault
                .re_key(&new_passcode)
                .await
                .context("Failed to re-encrypt vault")?;
            info!("Passcode set, {} tokens re-encrypted", vault.tokens().len());
        }
        Command::ClearPasscode => {
            vault.re_key("").await.context("Failed to clear passcode")?;
            info!("Passcode removed, tokens are stored unencrypted");
        }
        Command::Status | Command::Verify | Command::Reset { .. } | Command::Config { .. } => {
            unreachable!("handled before unlocking")
        }
    }
    Ok(())
}

async fn status(vault: &VaultStore, passcode: Option<&String>, as_json: bool) -> Result<()> {
    let configured = vault.is_passcode_configured().await?;
    let has_tokens = vault.has_stored_tokens().await?;
    let accepted = match passcode {
        Some(passcode) if configured => Some(vault.verify_passcode(passcode).await?),
        _ => None,
    };
    let status = VaultStatus::from_flags(configured, accepted == Some(true));

    if as_json {
        println!(
            "{}",
            json!({
                "status": status,
                "passcode_configured": configured,
                "has_stored_tokens": has_tokens,
                "passcode_accepted": accepted,
            })
        );
    } else {
        println!("Status: {}", status);
        println!("Passcode configured: {}", configured);
        println!("Stored tokens: {}", if has_tokens { "yes" } else { "none" });
        if accepted == Some(false) {
            println!("Supplied passcode was rejected");
        }
    }
    Ok(())
}

/// Exits non-zero when the passcode is rejected.
async fn verify(vault: &VaultStore, passcode: Option<&String>, as_json: bool) -> Result<ExitCode> {
    let candidate = passcode.map(String::as_str).unwrap_or("");
    let accepted = vault.verify_passcode(candidate).await?;

    if as_json {
        println!("{}", json!({ "accepted": accepted }));
    } else {
        println!("{}", if accepted { "Passcode accepted" } else { "Wrong passcode" });
    }

    Ok(if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn configure(vault: &VaultStore, data_dir: &std::path::Path, kdf: KdfChoice) -> Result<()> {
    if vault.is_passcode_configured().await? {
        bail!("Clear the passcode before changing key derivation, existing data would become unreadable");
    }

    let settings = VaultSettings { kdf: kdf.into() };
    save_settings(data_dir, &settings).context("Failed to save settings")?;
    info!("Key derivation set to {:?}", settings.kdf);
    Ok(())
}

fn list(tokens: &[Token], show_secrets: bool, as_json: bool) {
    if as_json {
        let entries: Vec<_> = tokens
            .iter()
            .enumerate()
            .map(|(index, token)| {
                let mut entry = json!({
                    "index": index,
                    "name": token.name,
                    "username": token.username,
                    "color": token.color,
                });
                if show_secrets {
                    entry["secret"] = json!(token.secret);
                }
                entry
            })
            .collect();
        println!("{}", serde_json::Value::Array(entries));
        return;
    }

    if tokens.is_empty() {
        println!("No tokens");
        return;
    }
    for (index, token) in tokens.iter().enumerate() {
        if show_secrets {
            println!(
                "{:>3}  {}  {}  {}  {}",
                index, token.name, token.username, token.color, token.secret
            );
        } else {
            println!("{:>3}  {}  {}  {}", index, token.name, token.username, token.color);
        }
    }
}
