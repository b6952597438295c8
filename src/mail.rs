//! Notification delivery.
//!
//! [`SmtpNotifier`] sends the message through an SMTP relay. [`DraftNotifier`]
//! writes the fully formatted message as an `.eml` file instead, so an
//! operator can review and send it by hand.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;
use tracing::info;

use crate::config::SmtpSettings;
use crate::contract::{BoxError, Notification, Notifier};

/// Builds a multipart message: plain text body plus every attachment as PDF.
pub async fn build_message(from: &Mailbox, notification: &Notification) -> Result<Message, BoxError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(notification.subject.clone());
    let mut recipients = 0;
    for address in notification.recipient.split(';').map(str::trim).filter(|a| !a.is_empty()) {
        builder = builder.to(address.parse::<Mailbox>()?);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(format!("no recipient in {:?}", notification.recipient).into());
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(notification.body.clone()));
    for path in &notification.attachments {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("cannot attach {}: {e}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment.pdf".to_string());
        parts = parts.singlepart(Attachment::new(filename).body(bytes, ContentType::parse("application/pdf")?));
    }
    Ok(builder.multipart(parts)?)
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings, from: Mailbox) -> Result<Self, BoxError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)?;
        if let Some(port) = settings.port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), BoxError> {
        let message = build_message(&self.from, notification).await?;
        self.transport.send(message).await?;
        info!(recipient = %notification.recipient, subject = %notification.subject, "Mail sent");
        Ok(())
    }
}

pub struct DraftNotifier {
    dir: PathBuf,
    from: Mailbox,
}

impl DraftNotifier {
    pub fn new(dir: impl Into<PathBuf>, from: Mailbox) -> Self {
        Self {
            dir: dir.into(),
            from,
        }
    }
}

#[async_trait]
impl Notifier for DraftNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), BoxError> {
        let message = build_message(&self.from, notification).await?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.eml", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, message.formatted()).await?;
        info!(draft = %path.display(), recipient = %notification.recipient, "Mail draft written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(attachment: PathBuf) -> Notification {
        Notification {
            subject: "Mandant 6840: Haushaltsentwurf fertig".into(),
            body: "Der Haushaltsentwurf wurde erstellt".into(),
            recipient: "kasse@example.org; leitung@example.org".into(),
            attachments: vec![attachment],
        }
    }

    #[tokio::test]
    async fn draft_contains_recipients_and_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("6840_Haushalt_2025.pdf");
        std::fs::write(&artifact, b"%PDF-1.5 test").unwrap();
        let outbox = dir.path().join("outbox");

        let notifier = DraftNotifier::new(&outbox, "watch@example.org".parse().unwrap());
        notifier.notify(&notification(artifact)).await.unwrap();

        let drafts: Vec<_> = std::fs::read_dir(&outbox).unwrap().collect();
        assert_eq!(drafts.len(), 1);
        let text = std::fs::read_to_string(drafts[0].as_ref().unwrap().path()).unwrap();
        assert!(text.contains("kasse@example.org"));
        assert!(text.contains("leitung@example.org"));
        assert!(text.contains("6840_Haushalt_2025.pdf"));
        assert!(text.contains("application/pdf"));
    }

    #[tokio::test]
    async fn missing_attachment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let from: Mailbox = "watch@example.org".parse().unwrap();
        let err = build_message(&from, &notification(dir.path().join("gone.pdf")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot attach"));
    }
}
