//! `SealMail` command-line front end.
//!
//! Generates keys, seals and opens messages, and encrypts attachments into
//! split key and data packets.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sealmail_core::model::EncryptedAttachment;
use sealmail_core::remote::{EncryptionPreferences, InMemoryTransport, StaticDirectory};
use sealmail_core::{
    AddressKeys, AttachmentCrypto, AttachmentFile, LocalId, Message, MessageProcessor, PrivateKey,
    PublicKey, Settings, StepOutcome, WireFormat,
};
use sealmail_crypto::{
    SealedCrypto, armor_private_key, armor_public_key, keys::public_key_of, parse_private_key,
    parse_public_key,
};

#[derive(Parser)]
#[command(name = "sealmail", version, about = "End-to-end encrypted mail toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, env = "SEALMAIL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair
    Keygen {
        /// Base name for `<name>.pub.asc` and `<name>.key.asc`
        name: String,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Encrypt a message body for one or more recipients
    Seal {
        input: PathBuf,
        /// Recipient public key files
        #[arg(long = "to", required = true)]
        recipients: Vec<PathBuf>,
        /// Private key file to sign with
        #[arg(long)]
        sign: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Decrypt and verify a sealed message
    Open {
        input: PathBuf,
        /// Private key file
        #[arg(long)]
        key: PathBuf,
        /// Sender address
        #[arg(long, default_value = "unknown@localhost")]
        sender: String,
        /// Sender public key files to verify against
        #[arg(long = "sender-key")]
        sender_keys: Vec<PathBuf>,
        /// The payload is a full MIME message
        #[arg(long)]
        mime: bool,
    },
    /// Encrypt a file into key and data packets
    EncryptAttachment {
        input: PathBuf,
        /// Recipient public key file
        #[arg(long = "to")]
        recipient: PathBuf,
        /// Private key file to sign with
        #[arg(long)]
        sign: Option<PathBuf>,
        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Decrypt an attachment written by `encrypt-attachment`
    DecryptAttachment {
        input: PathBuf,
        /// Private key file
        #[arg(long)]
        key: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Encrypted attachment as written to disk.
#[derive(Debug, Serialize, Deserialize)]
struct SealedAttachment {
    filename: String,
    mime_type: String,
    size: u64,
    key_packet: String,
    data_packet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealmail=info,sealmail_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&config)
        .await
        .with_context(|| format!("failed to load settings from {}", config.display()))?;
    debug!("Using settings {:?}", settings);

    let crypto = SealedCrypto::new();
    match cli.command {
        Commands::Keygen { name, output } => keygen(crypto, &name, &output).await,
        Commands::Seal {
            input,
            recipients,
            sign,
            output,
        } => seal(crypto, &input, &recipients, sign.as_deref(), &output).await,
        Commands::Open {
            input,
            key,
            sender,
            sender_keys,
            mime,
        } => open(crypto, settings, &input, &key, sender, &sender_keys, mime).await,
        Commands::EncryptAttachment {
            input,
            recipient,
            sign,
            mime_type,
            output,
        } => {
            encrypt_attachment(
                crypto,
                &input,
                &recipient,
                sign.as_deref(),
                mime_type,
                &output,
            )
            .await
        }
        Commands::DecryptAttachment { input, key, output } => {
            decrypt_attachment(crypto, &input, &key, &output).await
        }
    }
}

async fn keygen(crypto: SealedCrypto, name: &str, output: &Path) -> Result<()> {
    let (public, private) = crypto.generate_key();
    tokio::fs::create_dir_all(output).await?;

    let public_path = output.join(format!("{name}.pub.asc"));
    let private_path = output.join(format!("{name}.key.asc"));
    tokio::fs::write(&public_path, armor_public_key(&public)).await?;
    tokio::fs::write(&private_path, armor_private_key(&private).as_bytes()).await?;

    info!("Generated key {}", public.id());
    println!("{}", public.id());
    Ok(())
}

async fn seal(
    crypto: SealedCrypto,
    input: &Path,
    recipients: &[PathBuf],
    sign: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let data = read(input).await?;
    let mut public_keys = Vec::with_capacity(recipients.len());
    for path in recipients {
        public_keys.push(read_public_key(path).await?);
    }
    let signing_key = match sign {
        Some(path) => Some(read_private_key(path).await?),
        None => None,
    };

    let sealed = crypto.encrypt_message(&data, &public_keys, signing_key.as_ref())?;
    tokio::fs::write(output, sealed).await?;

    info!(
        "Sealed {} for {} recipients",
        input.display(),
        public_keys.len()
    );
    Ok(())
}

async fn open(
    crypto: SealedCrypto,
    settings: Settings,
    input: &Path,
    key: &Path,
    sender: String,
    sender_keys: &[PathBuf],
    mime: bool,
) -> Result<()> {
    let body = read(input).await?;
    let private = read_private_key(key).await?;
    let public = public_key_of(&private)?;

    let directory = Arc::new(StaticDirectory::new());
    if !sender_keys.is_empty() {
        let mut pinned_keys = Vec::with_capacity(sender_keys.len());
        for path in sender_keys {
            pinned_keys.push(read_public_key(path).await?);
        }
        directory.insert(
            &sender,
            EncryptionPreferences {
                pinned_keys,
                ..EncryptionPreferences::default()
            },
        );
    }

    let processor = MessageProcessor::new(
        Arc::new(crypto),
        Arc::new(InMemoryTransport::new()),
        directory,
        settings,
    );
    let local_id = LocalId::generate();
    processor.open(
        local_id.clone(),
        Message {
            sender,
            body: Bytes::from(body),
            format: if mime {
                WireFormat::Mime
            } else {
                WireFormat::Legacy
            },
            mime_type: "text/plain".into(),
            date: Utc::now(),
            ..Message::default()
        },
        AddressKeys {
            private: vec![private],
            public: vec![public],
        },
    );

    let outcome = processor.load(&local_id).await?;
    let state = processor
        .store()
        .get(&local_id)
        .context("message closed while loading")?
        .snapshot();

    for error in state.overlay.errors.iter() {
        eprintln!("error: {error}");
    }
    if outcome == StepOutcome::Failed {
        bail!("could not decrypt {}", input.display());
    }

    if let Some(subject) = &state.overlay.decrypted_subject {
        println!("Subject: {subject}");
    }
    println!("Signature: {}", state.overlay.verification.status());
    for attachment in &state.data.attachments {
        println!("Attachment: {} ({} bytes)", attachment.name, attachment.size);
    }
    println!();
    println!("{}", processor.rendered_body(&local_id).unwrap_or_default());

    processor.close(&local_id);
    Ok(())
}

async fn encrypt_attachment(
    crypto: SealedCrypto,
    input: &Path,
    recipient: &Path,
    sign: Option<&Path>,
    mime_type: Option<String>,
    output: &Path,
) -> Result<()> {
    let data = read(input).await?;
    let filename = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("input has no file name")?;
    let mime_type = mime_type.unwrap_or_else(|| guess_mime_type(&filename).to_string());

    let recipient = read_public_key(recipient).await?;
    let sender_keys = match sign {
        Some(path) => vec![read_private_key(path).await?],
        None => Vec::new(),
    };

    let file = AttachmentFile::new(filename, mime_type, data);
    let packets = AttachmentCrypto::new(Arc::new(crypto))
        .encrypt(Some(&file), false, &[recipient], &sender_keys)
        .await?;

    let sealed = SealedAttachment {
        filename: packets.filename,
        mime_type: packets.mime_type,
        size: packets.size,
        key_packet: STANDARD.encode(&packets.key_packet),
        data_packet: STANDARD.encode(&packets.data_packet),
        signature: packets.signature.map(|s| STANDARD.encode(s)),
    };
    tokio::fs::write(output, serde_json::to_vec_pretty(&sealed)?).await?;

    info!("Encrypted {} ({} bytes)", sealed.filename, sealed.size);
    Ok(())
}

async fn decrypt_attachment(
    crypto: SealedCrypto,
    input: &Path,
    key: &Path,
    output: &Path,
) -> Result<()> {
    let sealed: SealedAttachment = serde_json::from_slice(&read(input).await?)
        .with_context(|| format!("{} is not a sealed attachment", input.display()))?;
    let private = read_private_key(key).await?;

    let encrypted = EncryptedAttachment {
        key_packets: Bytes::from(STANDARD.decode(&sealed.key_packet)?),
        data_packet: Bytes::from(STANDARD.decode(&sealed.data_packet)?),
        mime_type: sealed.mime_type,
    };
    let plaintext = AttachmentCrypto::new(Arc::new(crypto))
        .decrypt(&encrypted, &[private])
        .await?;
    tokio::fs::write(output, &plaintext.data).await?;

    info!(
        "Decrypted {} ({}, {} bytes)",
        sealed.filename,
        plaintext.mime_type,
        plaintext.data.len()
    );
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn read_public_key(path: &Path) -> Result<PublicKey> {
    parse_public_key(&read(path).await?)
        .with_context(|| format!("{} is not a public key", path.display()))
}

async fn read_private_key(path: &Path) -> Result<PrivateKey> {
    parse_private_key(&read(path).await?)
        .with_context(|| format!("{} is not a private key", path.display()))
}

fn guess_mime_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "asc" => "application/pgp-keys",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
