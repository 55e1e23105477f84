//! # sealed-forms-cli.rs
//!
//! Ein Kommandozeilen-Tool für Schlüssel, Ausfüll-Links und die
//! Entschlüsselung von Einsendungen.
//!
//! ## Befehle:
//! - `generate-key`: Erzeugt ein neues Empfänger-Schlüsselpaar.
//! - `key-info`: Zeigt Fingerprint und Ablaufdatum eines Schlüssels.
//! - `embed-anchor`: Hängt einen Vertrauensanker an einen Ausfüll-Link.
//! - `show-anchor`: Liest den Vertrauensanker aus einem Ausfüll-Link.
//! - `decrypt`: Entschlüsselt eine armierte Nachricht mit lokalen Schlüsseln.
//! - `backup` / `restore`: Passwortgeschützte Schlüssel-Backups.
//! - `import-key`: Registriert einen geheimen Schlüssel und legt ihn lokal ab.
//! - `sync`: Synchronisiert die Einsendungen eines Formulars vom Server.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sealed_forms_lib::models::keys::KeyFingerprint;
use sealed_forms_lib::models::records::AuthTokenRecord;
use sealed_forms_lib::services::key_integrity::KeyIntegrityGuard;
use sealed_forms_lib::services::key_manager::{self, KeyResolver};
use sealed_forms_lib::services::submission_crypto::decrypt_blob;
use sealed_forms_lib::utils::now_millis;
use sealed_forms_lib::{BatchProgress, ClientContext, CoreConfig, PayloadType};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

/// Das Haupt-Struct für das CLI-Tool, das von `clap` geparst wird.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pfad zu einer TOML-Konfigurationsdatei.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Erzeugt ein neues Schlüsselpaar und schreibt `<fingerprint>.pub` und `<fingerprint>.key`.
    GenerateKey {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        /// Gültigkeit in Tagen (0 = maximal). Standard aus der Konfiguration.
        #[arg(long)]
        validity_days: Option<u32>,
        #[arg(short, long, default_value = "target/dev-keys")]
        out_dir: PathBuf,
    },

    /// Zeigt die Metadaten eines armierten Schlüssels.
    KeyInfo { key_file: PathBuf },

    /// Hängt die Fingerprints als Vertrauensanker an einen Ausfüll-Link.
    EmbedAnchor {
        link: Url,
        #[arg(short, long = "fingerprint", required = true)]
        fingerprints: Vec<String>,
    },

    /// Gibt die Fingerprints des Vertrauensankers eines Ausfüll-Links aus.
    ShowAnchor { link: Url },

    /// Entschlüsselt eine armierte Nachricht.
    Decrypt {
        /// Geheime Schlüsseldateien; es wird der passende gewählt.
        #[arg(short, long = "key", required = true)]
        keys: Vec<PathBuf>,
        /// Die Nachricht ist ein Datei-Anhang statt einer Einsendung.
        #[arg(long)]
        asset: bool,
        message_file: PathBuf,
        /// Zieldatei; ohne Angabe wird auf stdout geschrieben.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Erstellt ein passwortgeschütztes Backup eines geheimen Schlüssels.
    Backup {
        key_file: PathBuf,
        /// Ohne Angabe wird eine neue Passphrase erzeugt und ausgegeben.
        #[arg(long)]
        passphrase: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Stellt einen geheimen Schlüssel aus einem Backup wieder her.
    Restore {
        backup_file: PathBuf,
        #[arg(long)]
        passphrase: String,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Registriert einen vorhandenen geheimen Schlüssel beim Server und legt ihn lokal ab.
    ImportKey {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        key_file: PathBuf,
        #[arg(long, env = "SEALED_FORMS_TOKEN")]
        token: Option<String>,
    },

    /// Synchronisiert und entschlüsselt die Einsendungen eines Formulars.
    Sync {
        #[arg(long)]
        org: String,
        #[arg(long)]
        form: String,
        /// Auth-Token für die Verwaltungs-Endpunkte.
        #[arg(long, env = "SEALED_FORMS_TOKEN")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("Could not load configuration from {}", path.display()))?,
        None => CoreConfig::default(),
    };

    match cli.command {
        Commands::GenerateKey {
            org,
            user,
            validity_days,
            out_dir,
        } => generate_key(&org, &user, validity_days.unwrap_or(config.key_validity_days), &out_dir)?,
        Commands::KeyInfo { key_file } => key_info(&key_file)?,
        Commands::EmbedAnchor { link, fingerprints } => embed_anchor(&config, &link, &fingerprints)?,
        Commands::ShowAnchor { link } => show_anchor(&config, &link)?,
        Commands::Decrypt {
            keys,
            asset,
            message_file,
            output,
        } => decrypt(&keys, asset, &message_file, output.as_deref())?,
        Commands::Backup {
            key_file,
            passphrase,
            output,
        } => backup(&key_file, passphrase, &output)?,
        Commands::Restore {
            backup_file,
            passphrase,
            output,
        } => restore(&backup_file, &passphrase, &output)?,
        Commands::ImportKey {
            org,
            user,
            key_file,
            token,
        } => import_key(config, &org, &user, &key_file, token).await?,
        Commands::Sync { org, form, token } => sync(config, &org, &form, token).await?,
    }

    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
}

fn generate_key(org: &str, user: &str, validity_days: u32, out_dir: &Path) -> Result<()> {
    let keypair = key_manager::generate_keypair(org, user, chrono::Duration::days(i64::from(validity_days)))?;

    let public_path = out_dir.join(format!("{}.pub", keypair.fingerprint));
    let private_path = out_dir.join(format!("{}.key", keypair.fingerprint));
    write_text(&public_path, &keypair.public)?;
    write_text(&private_path, &keypair.private)?;

    println!("Fingerprint: {}", keypair.fingerprint);
    println!("Public key:  {}", public_path.display());
    println!("Secret key:  {}", private_path.display());
    Ok(())
}

fn key_info(key_file: &Path) -> Result<()> {
    let metadata = key_manager::key_metadata(&read_text(key_file)?)?;
    println!("Fingerprint: {}", metadata.fingerprint);
    println!("Algorithm:   {}", metadata.algorithm);
    println!("Secret:      {}", if metadata.has_secret { "yes" } else { "no" });
    match metadata.expires_at {
        Some(expiry) => println!("Expires:     {}", expiry.to_rfc3339()),
        None => println!("Expires:     never (rejected by form fillers)"),
    }
    Ok(())
}

fn embed_anchor(config: &CoreConfig, link: &Url, fingerprints: &[String]) -> Result<()> {
    let parsed = fingerprints
        .iter()
        .map(|f| KeyFingerprint::parse(f).with_context(|| format!("Invalid fingerprint '{}'", f)))
        .collect::<Result<Vec<_>>>()?;
    let guard = KeyIntegrityGuard::new(config.trust_anchor_param.clone());
    println!("{}", guard.embed_trust_anchor(link, &parsed));
    Ok(())
}

fn show_anchor(config: &CoreConfig, link: &Url) -> Result<()> {
    let guard = KeyIntegrityGuard::new(config.trust_anchor_param.clone());
    match guard.derive_trust_anchor(link)? {
        Some(anchor) => {
            for fingerprint in anchor.fingerprints() {
                println!("{}", fingerprint);
            }
        }
        None => println!("Link carries no trust anchor."),
    }
    Ok(())
}

fn decrypt(key_files: &[PathBuf], asset: bool, message_file: &Path, output: Option<&Path>) -> Result<()> {
    let keys = key_files.iter().map(|p| read_text(p)).collect::<Result<Vec<_>>>()?;
    let resolver = KeyResolver::new(&keys)?;
    let payload_type = if asset { PayloadType::Asset } else { PayloadType::Submission };

    let plaintext = decrypt_blob(&read_text(message_file)?, payload_type, &resolver)?;
    match output {
        Some(path) => fs::write(path, &plaintext).with_context(|| format!("Could not write {}", path.display()))?,
        None => std::io::stdout().write_all(&plaintext)?,
    }
    Ok(())
}

fn backup(key_file: &Path, passphrase: Option<String>, output: &Path) -> Result<()> {
    let passphrase = match passphrase {
        Some(p) => p,
        None => {
            let generated = key_manager::generate_backup_passphrase()?;
            println!("Backup passphrase (store it safely): {}", generated);
            generated
        }
    };
    let backup = key_manager::encrypt_key_for_backup(&read_text(key_file)?, &passphrase)?;
    write_text(output, &backup)?;
    println!("Backup written to {}", output.display());
    Ok(())
}

fn restore(backup_file: &Path, passphrase: &str, output: &Path) -> Result<()> {
    let restored = key_manager::decrypt_key_backup(&read_text(backup_file)?, passphrase)?;
    write_text(output, &restored.private)?;
    println!("Restored key {} to {}", restored.fingerprint, output.display());
    Ok(())
}

/// Verbindet sich mit dem Server und hinterlegt ein übergebenes Token für eine Stunde.
async fn connect(config: CoreConfig, token: Option<String>) -> Result<ClientContext> {
    let client = ClientContext::connect(config)?;
    if let Some(secret) = token {
        let now = now_millis();
        client
            .store_auth_token(&AuthTokenRecord {
                id: "cli".to_string(),
                token_secret: secret,
                created: now,
                expires: now + 60 * 60 * 1000,
            })
            .await?;
    }
    Ok(client)
}

async fn import_key(config: CoreConfig, org: &str, user: &str, key_file: &Path, token: Option<String>) -> Result<()> {
    let client = connect(config, token).await?;
    let server_id = client.import_key(org, user, &read_text(key_file)?).await?;
    println!("Registered key as {}", server_id);
    Ok(())
}

async fn sync(config: CoreConfig, org: &str, form: &str, token: Option<String>) -> Result<()> {
    let client = connect(config, token).await?;

    let (progress_tx, mut progress_rx) = watch::channel(BatchProgress::default());
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });
    let reporter = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let p = *progress_rx.borrow();
            info!(done = p.done, total = p.total, "Sync progress");
        }
    });

    let outcome = client.sync_submissions(org, form, &progress_tx, &cancel).await?;
    drop(progress_tx);
    let _ = reporter.await;

    let failed = outcome.submissions.iter().filter(|s| !s.is_success()).count();
    println!("{}", serde_json::to_string_pretty(&outcome.submissions)?);
    eprintln!(
        "{} submissions ({} new, {} removed, {} undecryptable)",
        outcome.submissions.len(),
        outcome.fetched,
        outcome.removed,
        failed
    );
    if failed > 0 && failed == outcome.submissions.len() {
        bail!("None of the submissions could be decrypted with the local keys");
    }
    Ok(())
}
