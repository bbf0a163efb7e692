//! Attachment text extraction
//!
//! `pdf`/`doc`/`docx` go through the remote extraction RPC; text files are decoded
//! locally. [`AttachmentSet`] tracks what the panel shows: pending refs, in-flight
//! filenames and per-file failures.

use super::types::{AttachmentError, AttachmentKind, AttachmentRef};
use crate::infrastructure::api::AssistantBackend;
use crate::infrastructure::auth::CredentialProvider;
use crate::util::errors::{ExploreError, ExploreResult};
use log::debug;
use std::path::Path;
use std::sync::Arc;

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "csv", "json", "yaml", "yml", "toml", "xml", "html", "htm", "log", "rtf",
];

/// A user-supplied file before extraction.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub async fn from_path(path: &Path) -> ExploreResult<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ExploreError::validation(format!("Invalid file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(filename, bytes))
    }
}

/// How an upload's text is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRoute {
    Remote(AttachmentKind),
    /// Lossy decode for plain text files.
    LocalLossy,
    /// Other text-like files; must be valid UTF-8.
    LocalStrict,
}

/// Classifies by extension first, then MIME type.
pub fn classify(filename: &str, mime_type: Option<&str>) -> ExtractionRoute {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("pdf") => return ExtractionRoute::Remote(AttachmentKind::Pdf),
        Some("doc") | Some("docx") => return ExtractionRoute::Remote(AttachmentKind::Docx),
        Some("txt") => return ExtractionRoute::LocalLossy,
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => return ExtractionRoute::LocalStrict,
        _ => {}
    }

    let mime = mime_type.map(|m| m.to_lowercase()).unwrap_or_default();
    if mime.contains("pdf") {
        ExtractionRoute::Remote(AttachmentKind::Pdf)
    } else if mime.contains("msword") || mime.contains("wordprocessingml") {
        ExtractionRoute::Remote(AttachmentKind::Docx)
    } else if mime.starts_with("text/plain") {
        ExtractionRoute::LocalLossy
    } else {
        ExtractionRoute::LocalStrict
    }
}

pub struct AttachmentPipeline {
    backend: Arc<dyn AssistantBackend>,
    credentials: Arc<dyn CredentialProvider>,
    max_bytes: usize,
}

impl AttachmentPipeline {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        credentials: Arc<dyn CredentialProvider>,
        max_bytes: usize,
    ) -> Self {
        Self {
            backend,
            credentials,
            max_bytes,
        }
    }

    /// Quick checks done before the filename is shown as loading.
    pub fn precheck(&self, upload: &AttachmentUpload) -> ExploreResult<()> {
        if upload.filename.trim().is_empty() {
            return Err(ExploreError::validation("Attachment filename must not be empty"));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(ExploreError::AttachmentTooLarge {
                filename: upload.filename.clone(),
                size: upload.bytes.len(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    pub async fn extract(&self, upload: AttachmentUpload) -> ExploreResult<AttachmentRef> {
        self.precheck(&upload)?;
        let route = classify(&upload.filename, upload.mime_type.as_deref());
        debug!(
            "Extracting attachment: filename={}, route={:?}, size={}",
            upload.filename,
            route,
            upload.bytes.len()
        );

        match route {
            ExtractionRoute::Remote(kind) => {
                let token = self.credentials.bearer_token().await.map_err(|e| {
                    ExploreError::extraction(&upload.filename, e.user_message())
                })?;
                let filename = upload.filename.clone();
                let file = self
                    .backend
                    .extract_text(&upload.filename, upload.bytes, &token)
                    .await
                    .map_err(|e| ExploreError::extraction(&filename, e.user_message()))?;
                let kind = match AttachmentKind::from_file_type(&file.file_type) {
                    served @ (AttachmentKind::Pdf | AttachmentKind::Docx) => served,
                    _ => kind,
                };
                Ok(AttachmentRef {
                    // The panel keys attachments by the name the user picked.
                    filename,
                    extracted_text: file.content,
                    kind,
                })
            }
            ExtractionRoute::LocalLossy => Ok(AttachmentRef {
                extracted_text: String::from_utf8_lossy(&upload.bytes).into_owned(),
                filename: upload.filename,
                kind: AttachmentKind::Txt,
            }),
            ExtractionRoute::LocalStrict => {
                let text = String::from_utf8(upload.bytes).map_err(|_| {
                    ExploreError::UnsupportedAttachment(format!(
                        "{} is not a text, PDF or Word document",
                        upload.filename
                    ))
                })?;
                Ok(AttachmentRef {
                    filename: upload.filename,
                    extracted_text: text,
                    kind: AttachmentKind::Other,
                })
            }
        }
    }
}

/// Pending attachments of the next outgoing turn.
#[derive(Debug, Clone, Default)]
pub struct AttachmentSet {
    pending: Vec<AttachmentRef>,
    /// May hold a filename more than once while duplicate uploads are pending.
    in_flight: Vec<String>,
    errors: Vec<AttachmentError>,
}

impl AttachmentSet {
    pub fn pending(&self) -> &[AttachmentRef] {
        &self.pending
    }

    pub fn in_flight(&self) -> &[String] {
        &self.in_flight
    }

    pub fn errors(&self) -> &[AttachmentError] {
        &self.errors
    }

    pub fn begin(&mut self, filename: &str) {
        self.errors.retain(|e| e.filename != filename);
        self.in_flight.push(filename.to_string());
    }

    /// Lands an extracted attachment. Returns `false` if its upload was removed
    /// or cleared while extraction ran.
    pub fn complete(&mut self, attachment: AttachmentRef) -> bool {
        if !self.finish(&attachment.filename) {
            return false;
        }
        self.pending.retain(|a| a.filename != attachment.filename);
        self.pending.push(attachment);
        true
    }

    pub fn fail(&mut self, filename: &str, message: impl Into<String>) -> bool {
        if !self.finish(filename) {
            return false;
        }
        self.errors.push(AttachmentError {
            filename: filename.to_string(),
            message: message.into(),
        });
        true
    }

    pub fn record_error(&mut self, filename: &str, message: impl Into<String>) {
        self.errors.retain(|e| e.filename != filename);
        self.errors.push(AttachmentError {
            filename: filename.to_string(),
            message: message.into(),
        });
    }

    pub fn remove(&mut self, filename: &str) -> bool {
        let before = self.pending.len() + self.in_flight.len() + self.errors.len();
        self.pending.retain(|a| a.filename != filename);
        self.in_flight.retain(|f| f != filename);
        self.errors.retain(|e| e.filename != filename);
        before != self.pending.len() + self.in_flight.len() + self.errors.len()
    }

    /// Hands the pending refs to an outgoing turn.
    pub fn take_pending(&mut self) -> Vec<AttachmentRef> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
        self.errors.clear();
    }

    fn finish(&mut self, filename: &str) -> bool {
        match self.in_flight.iter().position(|f| f == filename) {
            Some(index) => {
                self.in_flight.remove(index);
                true
            }
            None => false,
        }
    }
}
