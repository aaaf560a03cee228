//! MediaVault CLI - Command line interface for the media vault.
//!
//! Each invocation opens the installation, authenticates with the passcode
//! where the command needs it, runs the command and exits. Owner
//! authentication does not outlive the process.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use mediavault_app::{AppConfig, MediaVault};
use mediavault_auth::{AuthOutcome, LockoutStatus};
use mediavault_crypto::KdfParams;

#[derive(Parser)]
#[command(name = "mediavault")]
#[command(about = "MediaVault - Encrypted private media storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Data directory (default: platform data dir/mediavault).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration.
    Init {
        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "moderate")]
        strength: String,

        /// Overwrite an existing configuration.
        #[arg(long)]
        force: bool,
    },

    /// Show passcode, lockout and key state.
    Status,

    /// Set the passcode (asks for the current one if set).
    SetPasscode,

    /// Change the passcode.
    ChangePasscode,

    /// Remove the passcode.
    RemovePasscode,

    /// Check the passcode.
    Unlock,

    /// Encrypt a file.
    Encrypt {
        /// File to encrypt.
        #[arg(short, long)]
        source: PathBuf,

        /// Where to write the encrypted file.
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Decrypt a file.
    Decrypt {
        /// Encrypted file.
        #[arg(short, long)]
        source: PathBuf,

        /// Where to write the plaintext.
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Delete the master key. Existing encrypted files become unreadable.
    ResetKey {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: Failed to install logger: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "Command failed");
            eprintln!("Error: {}", user_message(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Could not determine a data directory; pass --data-dir")?
            .join("mediavault"),
    };

    match cli.command {
        Commands::Init { strength, force } => cmd_init(&data_dir, &strength, force),
        Commands::Status => cmd_status(&data_dir),
        Commands::SetPasscode => cmd_set_passcode(&data_dir),
        Commands::ChangePasscode => cmd_change_passcode(&data_dir),
        Commands::RemovePasscode => cmd_remove_passcode(&data_dir),
        Commands::Unlock => cmd_unlock(&data_dir),
        Commands::Encrypt { source, dest } => cmd_encrypt(&data_dir, &source, &dest),
        Commands::Decrypt { source, dest } => cmd_decrypt(&data_dir, &source, &dest),
        Commands::ResetKey { yes } => cmd_reset_key(&data_dir, yes),
    }
}

/// Render an error chain for the terminal.
///
/// Stops at the first `std::io::Error` so OS status codes only reach the
/// debug log.
fn user_message(err: &anyhow::Error) -> String {
    let parts: Vec<String> = err
        .chain()
        .take_while(|cause| !cause.is::<std::io::Error>())
        .map(|cause| cause.to_string())
        .collect();

    if parts.is_empty() {
        "Operation failed (run with --verbose for details)".to_string()
    } else {
        parts.join(": ")
    }
}

/// Prompt for a passcode without echo.
fn prompt_passcode(prompt: &str) -> Result<Zeroizing<String>> {
    let passcode = rpassword::prompt_password(prompt).context("Failed to read passcode")?;
    Ok(Zeroizing::new(passcode))
}

/// Prompt for a new passcode twice.
fn prompt_new_passcode() -> Result<Zeroizing<String>> {
    let passcode = prompt_passcode("New passcode: ")?;
    let confirm = prompt_passcode("Confirm passcode: ")?;

    if *passcode != *confirm {
        anyhow::bail!("Passcodes do not match");
    }
    Ok(passcode)
}

fn open_vault(data_dir: &Path) -> Result<MediaVault> {
    MediaVault::open(data_dir)
        .with_context(|| format!("Failed to open vault at {}", data_dir.display()))
}

/// Authenticate with the passcode for this invocation.
fn unlock(vault: &MediaVault) -> Result<()> {
    if !vault.passcodes().has_passcode()? {
        anyhow::bail!("No passcode is set. Run `mediavault set-passcode` first");
    }

    let passcode = prompt_passcode("Passcode: ")?;
    match vault.unlock_with_passcode(&passcode)? {
        AuthOutcome::Authenticated => Ok(()),
        AuthOutcome::Failed(reason) => anyhow::bail!("{}", reason),
    }
}

/// Write a default configuration.
fn cmd_init(data_dir: &Path, strength: &str, force: bool) -> Result<()> {
    let Some(kdf) = KdfParams::from_name(strength) else {
        anyhow::bail!("Invalid strength. Use: interactive, moderate, or sensitive");
    };

    let path = AppConfig::path(data_dir);
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let config = AppConfig {
        kdf,
        ..AppConfig::default()
    };
    config.save(data_dir).context("Failed to write configuration")?;

    info!("Initialized vault at {}", data_dir.display());
    println!("Configuration written to {}", path.display());
    println!("Next: run `mediavault set-passcode`.");

    Ok(())
}

/// Show vault status.
fn cmd_status(data_dir: &Path) -> Result<()> {
    let vault = open_vault(data_dir)?;
    let status = vault.status()?;
    let config = vault.config();

    println!("Vault Status:");
    println!("  Data directory: {}", data_dir.display());
    println!(
        "  Passcode: {}",
        if status.passcode_set { "set" } else { "not set" }
    );
    println!(
        "  Master key: {}",
        if status.master_key_present {
            "present"
        } else {
            "not created"
        }
    );
    match status.lockout {
        LockoutStatus::Unlocked {
            failed_attempts,
            remaining_attempts,
        } => {
            println!(
                "  Lockout: none ({} failed, {} attempts remaining)",
                failed_attempts, remaining_attempts
            );
        }
        LockoutStatus::LockedOut { until, remaining } => {
            println!(
                "  Lockout: locked until {} ({}s remaining)",
                until.to_rfc3339(),
                remaining.as_secs()
            );
        }
    }
    println!("  KDF Parameters:");
    println!("    Memory: {} KiB", config.kdf.memory_cost);
    println!("    Time: {} iterations", config.kdf.time_cost);
    println!("    Parallelism: {}", config.kdf.parallelism);

    Ok(())
}

/// Set or replace the passcode.
fn cmd_set_passcode(data_dir: &Path) -> Result<()> {
    let vault = open_vault(data_dir)?;

    if vault.passcodes().has_passcode()? {
        println!("A passcode is already set. Enter it to replace it.");
        unlock(&vault)?;
    }

    let passcode = prompt_new_passcode()?;
    vault
        .set_passcode(&passcode)
        .context("Failed to set passcode")?;

    println!("Passcode set.");
    Ok(())
}

/// Change the passcode.
fn cmd_change_passcode(data_dir: &Path) -> Result<()> {
    let vault = open_vault(data_dir)?;
    if !vault.passcodes().has_passcode()? {
        anyhow::bail!("No passcode is set. Run `mediavault set-passcode` first");
    }

    let current = prompt_passcode("Current passcode: ")?;
    let new = prompt_new_passcode()?;

    match vault
        .change_passcode(&current, &new)
        .context("Failed to change passcode")?
    {
        AuthOutcome::Authenticated => {
            println!("Passcode changed.");
            Ok(())
        }
        AuthOutcome::Failed(reason) => anyhow::bail!("{}", reason),
    }
}

/// Remove the passcode.
fn cmd_remove_passcode(data_dir: &Path) -> Result<()> {
    let vault = open_vault(data_dir)?;
    unlock(&vault)?;

    vault
        .remove_passcode()
        .context("Failed to remove passcode")?;

    println!("Passcode removed.");
    Ok(())
}

/// Check the passcode.
fn cmd_unlock(data_dir: &Path) -> Result<()> {
    let vault = open_vault(data_dir)?;
    unlock(&vault)?;

    println!("Passcode accepted.");
    Ok(())
}

/// Encrypt a file.
fn cmd_encrypt(data_dir: &Path, source: &Path, dest: &Path) -> Result<()> {
    info!("Encrypting {} to {}", source.display(), dest.display());

    let vault = open_vault(data_dir)?;
    unlock(&vault)?;

    let written = vault
        .encrypt_file(source, dest)
        .context("Failed to encrypt file")?;

    println!("File encrypted: {} ({} bytes)", dest.display(), written);
    Ok(())
}

/// Decrypt a file.
fn cmd_decrypt(data_dir: &Path, source: &Path, dest: &Path) -> Result<()> {
    info!("Decrypting {} to {}", source.display(), dest.display());

    let vault = open_vault(data_dir)?;
    unlock(&vault)?;

    let written = vault
        .decrypt_file(source, dest)
        .context("Failed to decrypt file")?;

    println!("File decrypted: {} ({} bytes)", dest.display(), written);
    Ok(())
}

/// Delete the master key.
fn cmd_reset_key(data_dir: &Path, yes: bool) -> Result<()> {
    let vault = open_vault(data_dir)?;
    unlock(&vault)?;

    if !yes {
        print!("Every file encrypted so far will become unreadable. Type 'reset' to continue: ");
        std::io::stdout().flush()?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        if answer.trim() != "reset" {
            println!("Aborted.");
            return Ok(());
        }
    }

    vault.reset_key().context("Failed to delete master key")?;

    println!("Master key deleted. A new key is created on the next encryption.");
    Ok(())
}
