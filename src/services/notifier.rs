// src/services/notifier.rs

//! Email notifier.
//!
//! Composes the HTML report of changed documents, grouped by category, with
//! an optional inline logo and the changed files attached, and delivers it
//! over SMTP.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{ChangeVerdict, Config, EmailConfig, NotifyConfig};
use crate::utils::http::{RetryPolicy, create_client};
use crate::utils::{escape_html, filename_from_url};

const BRAND_COLOR: &str = "#2e3192";
const LOGO_CID: &str = "logo@leiaute-monitor";

/// What a run hands to the notification channel.
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    /// Reference date (`dd/mm/yyyy`)
    pub reference_date: String,
    /// Changed locators, possibly none
    pub verdicts: Vec<ChangeVerdict>,
}

/// Delivers change reports to operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a report, returning how many notifications went out.
    async fn notify(&self, report: &ChangeReport) -> Result<usize>;

    /// Addresses the report is delivered to.
    fn recipients(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A downloaded file ready to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// SMTP notifier built with `lettre`.
pub struct EmailNotifier {
    client: Client,
    retry: RetryPolicy,
    notify: NotifyConfig,
    email: EmailConfig,
    logo_path: Option<PathBuf>,
}

impl EmailNotifier {
    pub fn new(
        client: Client,
        retry: RetryPolicy,
        notify: NotifyConfig,
        email: EmailConfig,
        logo_path: Option<PathBuf>,
    ) -> Self {
        Self {
            client,
            retry,
            notify,
            email,
            logo_path,
        }
    }

    /// Build a notifier; the logo path resolves against `base_dir`.
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Self> {
        Ok(Self::new(
            create_client(&config.http)?,
            RetryPolicy::from_config(&config.http),
            config.notify.clone(),
            config.email.clone(),
            config.logo_path(base_dir),
        ))
    }

    pub fn subject(&self, reference_date: &str) -> String {
        self.notify.subject.replace("{date}", reference_date)
    }

    /// Download a changed file within the single-file size limit.
    pub async fn fetch_attachment(&self, url: &str) -> Result<FileAttachment> {
        let limit = self.notify.max_single_attachment_bytes;
        let mut response = self.retry.send(self.client.get(url)).await?;

        if !response.status().is_success() {
            return Err(AppError::probe(url, format!("status {}", response.status())));
        }
        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(AppError::probe(
                    url,
                    format!("Content-Length {length} exceeds {limit} bytes"),
                ));
            }
        }

        let filename = filename_from_url(response.url().as_str());
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > limit {
                return Err(AppError::probe(url, format!("body exceeds {limit} bytes")));
            }
        }

        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(FileAttachment {
            filename,
            content_type,
            bytes,
        })
    }

    /// Download the changed files, honoring count and total size limits.
    pub async fn collect_attachments(&self, verdicts: &[ChangeVerdict]) -> Vec<FileAttachment> {
        let mut attachments = Vec::new();
        let mut total = 0u64;

        for verdict in verdicts {
            if attachments.len() >= self.notify.max_attachments {
                log::warn!(
                    "Attachment limit of {} reached, skipping the rest",
                    self.notify.max_attachments
                );
                break;
            }

            match self.fetch_attachment(&verdict.locator).await {
                Ok(file) => {
                    let size = file.bytes.len() as u64;
                    if total + size > self.notify.max_total_attachment_bytes {
                        log::warn!("Attachment skipped (total size limit): {}", file.filename);
                        continue;
                    }
                    total += size;
                    attachments.push(file);
                }
                Err(e) => log::warn!("Could not attach {}: {}", verdict.locator, e),
            }
        }

        attachments
    }

    async fn read_logo(&self) -> Option<Vec<u8>> {
        let path = self.logo_path.as_ref()?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Logo {} unavailable: {}", path.display(), e);
                None
            }
        }
    }

    /// Assemble the complete MIME message.
    pub fn build_message(
        &self,
        report: &ChangeReport,
        logo: Option<Vec<u8>>,
        attachments: Vec<FileAttachment>,
    ) -> Result<Message> {
        let sender = self
            .email
            .sender()
            .ok_or_else(|| AppError::mail("no sender address configured"))?;

        let mut builder = Message::builder()
            .from(parse_mailbox(sender)?)
            .subject(self.subject(&report.reference_date));
        for recipient in &self.email.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        let logo_cid = logo.as_ref().map(|_| LOGO_CID);
        let html = if report.verdicts.is_empty() {
            no_changes_html(&report.reference_date, logo_cid)
        } else {
            changes_html(&report.verdicts, &report.reference_date, logo_cid)
        };

        let mut related = MultiPart::related().singlepart(SinglePart::html(html));
        if let Some(bytes) = logo {
            let logo_path = self.logo_path.as_deref().unwrap_or(Path::new("logo.jpg"));
            let content_type = mime_guess::from_path(logo_path).first_or_octet_stream();
            related = related.singlepart(
                Attachment::new_inline(LOGO_CID.to_string())
                    .body(bytes, parse_content_type(content_type.essence_str())?),
            );
        }

        let mut body = MultiPart::mixed().multipart(related);
        for file in attachments {
            body = body.singlepart(
                Attachment::new(file.filename).body(file.bytes, parse_content_type(&file.content_type)?),
            );
        }

        builder.multipart(body).map_err(AppError::mail)
    }

    async fn deliver(&self, message: Message) -> Result<()> {
        let host = self.email.host.as_str();
        let builder = if self.email.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host).map_err(AppError::mail)?
        } else if self.email.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(AppError::mail)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let mut transport = builder.port(self.email.port);

        if let (Some(user), Some(password)) = (self.email.user.clone(), self.email.resolved_password()) {
            transport = transport.credentials(Credentials::new(user, password));
        }

        transport
            .build()
            .send(message)
            .await
            .map_err(AppError::mail)?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, report: &ChangeReport) -> Result<usize> {
        if report.verdicts.is_empty() && !self.notify.send_when_no_changes {
            log::info!("No changes and no-change reports disabled; nothing sent");
            return Ok(0);
        }
        if self.email.to.is_empty() {
            log::warn!("No recipients configured; report not sent");
            return Ok(0);
        }

        let attachments = if self.notify.attach_changed_files {
            self.collect_attachments(&report.verdicts).await
        } else {
            Vec::new()
        };
        log::info!("Attaching {} file(s)", attachments.len());

        let logo = self.read_logo().await;
        let message = self.build_message(report, logo, attachments)?;
        self.deliver(message).await?;

        log::info!("Email sent to: {}", self.email.to.join(", "));
        Ok(1)
    }

    fn recipients(&self) -> Vec<String> {
        self.email.to.clone()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| AppError::mail(format!("invalid address {address}: {e}")))
}

fn parse_content_type(value: &str) -> Result<ContentType> {
    ContentType::parse(value).map_err(|e| AppError::mail(format!("invalid content type {value}: {e}")))
}

/// Changed files as links, grouped by category in first-seen order.
pub fn changes_html(verdicts: &[ChangeVerdict], reference_date: &str, logo_cid: Option<&str>) -> String {
    let mut groups: Vec<(&str, Vec<&ChangeVerdict>)> = Vec::new();
    for verdict in verdicts {
        match groups.iter_mut().find(|(c, _)| *c == verdict.category) {
            Some((_, items)) => items.push(verdict),
            None => groups.push((verdict.category.as_str(), vec![verdict])),
        }
    }

    let mut content = format!(
        "<p style='font-size:17px;'><strong style='color:{BRAND_COLOR};'>Arquivo(s) encontrado(s):</strong></p>"
    );
    for (category, items) in groups {
        content.push_str(&format!("<p><strong>{}</strong></p><ul>", escape_html(category)));
        for verdict in items {
            content.push_str(&format!(
                "<li><a href=\"{}\" target=\"_blank\" style=\"color:{BRAND_COLOR}; text-decoration:none;\">{}</a></li>",
                escape_html(&verdict.locator),
                escape_html(&filename_from_url(&verdict.locator)),
            ));
        }
        content.push_str("</ul>");
    }

    let intro = format!(
        "<p style=\"font-size:18px; margin-top:24px;\">Foram identificadas possíveis atualizações na data de <strong>{}</strong>.</p>",
        escape_html(reference_date)
    );
    page_html(&format!("{intro}\n{content}"), logo_cid)
}

/// Body sent when nothing changed.
pub fn no_changes_html(reference_date: &str, logo_cid: Option<&str>) -> String {
    let content = format!(
        "<p style=\"text-align:left; color:{BRAND_COLOR}; font-size:18px; margin-top:24px; line-height:1.55;\">\
         <strong>Não há documentos novos ou alterados na data de {}</strong>.</p>",
        escape_html(reference_date)
    );
    page_html(&content, logo_cid)
}

fn page_html(content: &str, logo_cid: Option<&str>) -> String {
    let logo = logo_cid
        .map(|cid| {
            format!(
                "<div style=\"text-align:center; margin-bottom:12px;\">\
                 <img src=\"cid:{cid}\" alt=\"Logo\" style=\"max-width:220px; height:auto;\"></div>"
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="pt-br">
<head>
<meta charset="UTF-8">
<style>
  body {{ font-family: Arial, sans-serif; margin: 20px; color:#111; }}
  .wrap {{ width: 100%; margin: 0 auto; }}
  a {{ color: #1a73e8; text-decoration: none; }}
  .rodape {{ font-size: 12px; color: #555; margin-top: 40px; text-align: center; }}
</style>
</head>
<body>
  <div class="wrap">
    {logo}
    {content}
    <div class="rodape">
      Este e-mail foi gerado automaticamente pelo sistema de monitoramento de leiautes.
    </div>
  </div>
</body>
</html>"#
    )
}
