//! Files staged for the next user message.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::core::backend::BackendId;
use crate::core::config::data::path_display;
use crate::core::message::Part;

pub const MAX_ATTACHMENTS: usize = 10;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug)]
pub enum AttachmentError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Staging would exceed [`MAX_ATTACHMENTS`].
    TooMany { staged: usize, requested: usize },
    /// The active backend is text-only.
    Unsupported(BackendId),
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path_display(path), source)
            }
            AttachmentError::TooMany { staged, requested } => write!(
                f,
                "At most {MAX_ATTACHMENTS} files can be attached. {staged} already staged, {requested} more selected."
            ),
            AttachmentError::Unsupported(backend) => {
                write!(f, "The {backend} backend does not accept attachments")
            }
        }
    }
}

impl StdError for AttachmentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AttachmentError::Read { source, .. } => Some(source),
            AttachmentError::TooMany { .. } | AttachmentError::Unsupported(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAttachment {
    pub name: String,
    pub mime_type: String,
    /// `data:` URL for previews.
    pub preview_data: String,
    /// Base64 payload sent to the model.
    pub encoded_data: String,
}

impl StagedAttachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: Option<&str>, bytes: &[u8]) -> Self {
        let mime_type = mime_type
            .filter(|mime| !mime.is_empty())
            .unwrap_or(FALLBACK_MIME)
            .to_string();
        let encoded_data = BASE64.encode(bytes);
        Self {
            name: name.into(),
            preview_data: format!("data:{mime_type};base64,{encoded_data}"),
            mime_type,
            encoded_data,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let bytes = fs::read(path).map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, mime_for_path(path), &bytes))
    }

    pub fn to_part(&self) -> Part {
        Part::inline(self.mime_type.clone(), self.encoded_data.clone())
    }
}

/// MIME type guessed from the file extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentTray {
    items: Vec<StagedAttachment>,
}

impl AttachmentTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a batch as a whole; nothing is staged if the batch would not fit.
    pub fn stage_all(&mut self, batch: Vec<StagedAttachment>) -> Result<(), AttachmentError> {
        if self.items.len() + batch.len() > MAX_ATTACHMENTS {
            return Err(AttachmentError::TooMany {
                staged: self.items.len(),
                requested: batch.len(),
            });
        }
        self.items.extend(batch);
        Ok(())
    }

    pub fn stage(&mut self, attachment: StagedAttachment) -> Result<(), AttachmentError> {
        self.stage_all(vec![attachment])
    }

    pub fn remove(&mut self, index: usize) -> Option<StagedAttachment> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedAttachment> {
        self.items.iter()
    }

    /// Empties the tray and returns the staged files as inline parts.
    pub fn take_parts(&mut self) -> Vec<Part> {
        self.items.drain(..).map(|item| item.to_part()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(name: &str) -> StagedAttachment {
        StagedAttachment::from_bytes(name, Some("image/png"), &[1, 2, 3])
    }

    #[test]
    fn from_bytes_builds_preview_and_payload() {
        let attachment = sample("a.png");
        assert_eq!(attachment.encoded_data, "AQID");
        assert_eq!(attachment.preview_data, "data:image/png;base64,AQID");

        let unknown = StagedAttachment::from_bytes("blob", None, b"x");
        assert_eq!(unknown.mime_type, "application/octet-stream");
    }

    #[test]
    fn batch_over_limit_is_rejected_whole() {
        let mut tray = AttachmentTray::new();
        tray.stage_all((0..8).map(|i| sample(&format!("{i}.png"))).collect())
            .expect("eight fit");

        let err = tray
            .stage_all(vec![sample("x.png"), sample("y.png"), sample("z.png")])
            .expect_err("eleven do not fit");
        assert!(matches!(err, AttachmentError::TooMany { staged: 8, requested: 3 }));
        assert_eq!(tray.len(), 8);

        tray.stage_all(vec![sample("x.png"), sample("y.png")])
            .expect("ten fit");
        assert_eq!(tray.len(), MAX_ATTACHMENTS);
    }

    #[test]
    fn take_parts_empties_tray() {
        let mut tray = AttachmentTray::new();
        tray.stage(sample("a.png")).expect("stage");
        let parts = tray.take_parts();
        assert_eq!(parts, vec![Part::inline("image/png", "AQID")]);
        assert!(tray.is_empty());
    }

    #[test]
    fn from_path_reads_file_and_guesses_type() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("Photo.JPG");
        fs::write(&path, [0xff, 0xd8]).expect("write");

        let attachment = StagedAttachment::from_path(&path).expect("read");
        assert_eq!(attachment.name, "Photo.JPG");
        assert_eq!(attachment.mime_type, "image/jpeg");

        let missing = StagedAttachment::from_path(&dir.path().join("nope.png"));
        assert!(matches!(missing, Err(AttachmentError::Read { .. })));
    }

    #[test]
    fn common_media_types_are_recognised() {
        let guess = |name: &str| mime_for_path(Path::new(name));
        assert_eq!(guess("song.flac"), Some("audio/flac"));
        assert_eq!(guess("scan.bmp"), Some("image/bmp"));
        assert_eq!(guess("clip.mov"), Some("video/quicktime"));
        assert_eq!(guess("page.html"), Some("text/html"));
        assert_eq!(guess("paper.pdf"), Some("application/pdf"));
        assert_eq!(guess("no_extension"), None);
    }
}
