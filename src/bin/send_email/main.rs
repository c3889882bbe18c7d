#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Sends one email through the configured medium

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use mail_dispatch::{
    domain::communication::{
        mail_service::MailService,
        mailer::{Attachment, OutboundMessage, Sender},
    },
    infrastructure::email::{select_mailer, MailConfig},
};

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The mail configuration
    #[clap(flatten)]
    pub mail: MailConfig,

    /// Recipient address, may be repeated
    #[arg(long, required = true)]
    pub to: Vec<String>,

    /// Carbon copy address, may be repeated
    #[arg(long)]
    pub cc: Vec<String>,

    /// Sender address, overrides EMAIL_FROM
    #[arg(long)]
    pub from: Option<String>,

    /// Display name for --from
    #[arg(long, requires = "from")]
    pub from_name: Option<String>,

    /// The subject
    #[arg(long, default_value = "")]
    pub subject: String,

    /// The plain text body
    #[arg(long)]
    pub text: Option<String>,

    /// File holding the HTML body
    #[arg(long)]
    pub html_file: Option<PathBuf>,

    /// File to attach, may be repeated
    #[arg(long)]
    pub attach: Vec<PathBuf>,
}

impl Args {
    /// Builds the message described by the arguments
    fn message(&self) -> Result<OutboundMessage> {
        let html = self
            .html_file
            .as_ref()
            .map(|path| {
                fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
            })
            .transpose()?;

        let from = self.from.clone().map(|email| match self.from_name.clone() {
            Some(name) => Sender::Named { name, email },
            None => Sender::Address(email),
        });

        let attachments = self
            .attach
            .iter()
            .map(|path| attachment(path))
            .collect::<Result<Vec<_>>>()?;

        Ok(OutboundMessage {
            to: self.to.clone(),
            cc: self.cc.clone(),
            from,
            subject: self.subject.clone(),
            text: self.text.clone(),
            html,
            attachments,
        })
    }
}

fn attachment(path: &Path) -> Result<Attachment> {
    let content = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;

    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    Ok(Attachment::new(filename, content_type, content))
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let message = args.message()?;

    let mailer = select_mailer(&args.mail).await?;
    let service = MailService::new(Arc::new(mailer), args.mail.settings());

    let response = service.send_email(message).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
