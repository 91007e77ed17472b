//! Mail fetcher — pulls attachments from a mail drop into the intake queue.
//!
//! The scheduler talks to the fetcher through the [`MailFetch`] trait. The
//! production [`MaildirFetcher`] reads raw messages from a maildir-style
//! drop directory (`<maildir>/new`), extracts their attachments with
//! `mail_parser`, and delivers them to the consumption directory where the
//! next drain picks them up. How messages arrive in the drop directory
//! (IMAP sync, MDA delivery) is outside this daemon.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::MailFetchError;
use crate::storage;

/// One mail pull. The fetcher owns its own `last_checked` timestamp.
///
/// Implementations record the attempt time at the *start* of a pull, so the
/// scheduler's throttle holds even when the pull fails or is cut off at its
/// deadline. The timestamp only moves forward.
#[async_trait]
pub trait MailFetch: Send {
    async fn pull(&mut self) -> Result<(), MailFetchError>;

    /// When the last pull was attempted, if ever.
    fn last_checked(&self) -> Option<DateTime<Utc>>;
}

/// Maildir-backed fetcher. Disabled (pull is a no-op) when no maildir is
/// configured.
#[derive(Debug)]
pub struct MaildirFetcher {
    new_dir: Option<PathBuf>,
    consumption_dir: PathBuf,
    last_checked: Option<DateTime<Utc>>,
}

impl MaildirFetcher {
    /// Create a fetcher. A configured maildir without a `new/` subdirectory
    /// is a startup misconfiguration; no maildir at all yields a disabled
    /// fetcher.
    pub fn new(
        maildir: Option<PathBuf>,
        consumption_dir: impl Into<PathBuf>,
    ) -> Result<Self, MailFetchError> {
        let new_dir = match maildir {
            Some(root) => {
                let new_dir = root.join("new");
                if !new_dir.is_dir() {
                    return Err(MailFetchError::Misconfigured { path: root });
                }
                Some(new_dir)
            }
            None => {
                info!("Mail fetching disabled (no maildir configured)");
                None
            }
        };
        Ok(Self {
            new_dir,
            consumption_dir: consumption_dir.into(),
            last_checked: None,
        })
    }

    /// Whether this fetcher will actually pull anything.
    pub fn is_enabled(&self) -> bool {
        self.new_dir.is_some()
    }

    /// Extract attachments from one raw message into the intake queue.
    /// Returns the number of attachments delivered.
    async fn deliver_attachments(&self, raw: &[u8]) -> Result<usize, MailFetchError> {
        let Some(parsed) = MessageParser::default().parse(raw) else {
            return Ok(0);
        };

        let mut delivered = 0usize;
        for (index, part) in parsed.attachments().enumerate() {
            let name = MimeHeaders::attachment_name(part)
                .map(str::to_string)
                .unwrap_or_else(|| format!("attachment-{index}"));

            let dest = storage::unique_destination(&self.consumption_dir, &name);
            fs::write(&dest, part.contents())
                .await
                .map_err(|source| MailFetchError::Deliver {
                    name: name.clone(),
                    source,
                })?;
            debug!(attachment = %name, to = %dest.display(), "Delivered attachment");
            delivered += 1;
        }
        Ok(delivered)
    }
}

#[async_trait]
impl MailFetch for MaildirFetcher {
    async fn pull(&mut self) -> Result<(), MailFetchError> {
        // Stamp the attempt up front so a failing pull is still throttled.
        self.last_checked = Some(Utc::now());

        let Some(new_dir) = self.new_dir.clone() else {
            return Ok(());
        };

        let mut entries = fs::read_dir(&new_dir)
            .await
            .map_err(|source| MailFetchError::Read {
                path: new_dir.clone(),
                source,
            })?;

        let mut messages = 0usize;
        let mut attachments = 0usize;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| MailFetchError::Read {
                path: new_dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let raw = fs::read(&path)
                .await
                .map_err(|source| MailFetchError::Read {
                    path: path.clone(),
                    source,
                })?;

            let delivered = self.deliver_attachments(&raw).await?;
            if delivered == 0 {
                warn!(message = %path.display(), "Message carried no attachments");
            }

            // Processed either way; a message is never visited twice.
            fs::remove_file(&path)
                .await
                .map_err(|source| MailFetchError::Read { path, source })?;
            messages += 1;
            attachments += delivered;
        }

        if messages > 0 {
            info!("Pulled {attachments} attachment(s) from {messages} message(s)");
        }
        Ok(())
    }

    fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE_WITH_ATTACHMENT: &str = "From: scanner@example.com\n\
Subject: scanned document\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"XBOUNDARY\"\n\
\n\
--XBOUNDARY\n\
Content-Type: text/plain\n\
\n\
see attached\n\
--XBOUNDARY\n\
Content-Type: application/pdf; name=\"report.pdf\"\n\
Content-Disposition: attachment; filename=\"report.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
aGVsbG8gd29ybGQ=\n\
--XBOUNDARY--\n";

    fn maildir_in(tmp: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        let maildir = tmp.path().join("mail");
        let consume = tmp.path().join("consume");
        std::fs::create_dir_all(maildir.join("new")).unwrap();
        std::fs::create_dir_all(&consume).unwrap();
        (maildir, consume)
    }

    #[test]
    fn missing_new_subdir_is_misconfiguration() {
        let tmp = tempfile::tempdir().unwrap();
        let bare = tmp.path().join("mail");
        std::fs::create_dir_all(&bare).unwrap();
        let err = MaildirFetcher::new(Some(bare), tmp.path().join("consume")).unwrap_err();
        assert!(matches!(err, MailFetchError::Misconfigured { .. }));
    }

    #[tokio::test]
    async fn disabled_fetcher_pull_is_a_stamped_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fetcher = MaildirFetcher::new(None, tmp.path().join("consume")).unwrap();
        assert!(!fetcher.is_enabled());
        assert!(fetcher.last_checked().is_none());

        fetcher.pull().await.unwrap();
        assert!(fetcher.last_checked().is_some());
    }

    #[tokio::test]
    async fn pull_delivers_attachments_and_removes_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let (maildir, consume) = maildir_in(&tmp);
        let message = maildir.join("new/1700000000.msg");
        std::fs::write(&message, MESSAGE_WITH_ATTACHMENT).unwrap();

        let mut fetcher = MaildirFetcher::new(Some(maildir), &consume).unwrap();
        fetcher.pull().await.unwrap();

        let delivered = consume.join("report.pdf");
        assert_eq!(std::fs::read(&delivered).unwrap(), b"hello world");
        assert!(!message.exists(), "processed message must be removed");
    }

    #[tokio::test]
    async fn pull_on_empty_maildir_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let (maildir, consume) = maildir_in(&tmp);

        let mut fetcher = MaildirFetcher::new(Some(maildir), &consume).unwrap();
        fetcher.pull().await.unwrap();
        assert!(fetcher.last_checked().is_some());
        assert_eq!(std::fs::read_dir(&consume).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn attachment_name_collisions_get_a_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let (maildir, consume) = maildir_in(&tmp);
        std::fs::write(consume.join("report.pdf"), b"earlier").unwrap();
        std::fs::write(maildir.join("new/2.msg"), MESSAGE_WITH_ATTACHMENT).unwrap();

        let mut fetcher = MaildirFetcher::new(Some(maildir), &consume).unwrap();
        fetcher.pull().await.unwrap();

        assert!(consume.join("report.pdf").exists());
        assert_eq!(
            std::fs::read(consume.join("report-1.pdf")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn last_checked_only_moves_forward() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fetcher = MaildirFetcher::new(None, tmp.path().join("consume")).unwrap();

        fetcher.pull().await.unwrap();
        let first = fetcher.last_checked().unwrap();
        fetcher.pull().await.unwrap();
        let second = fetcher.last_checked().unwrap();
        assert!(second >= first);
    }
}
