//! The unit of upload work.

use bytes::Bytes;

use crate::error::{UploadError, UploadResult};

/// Immutable payload-plus-name pair.
///
/// `name` is the logical (unprefixed) path; the environment namespace is
/// applied by the uploader. Both fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadContent {
    content: Bytes,
    name: String,
}

impl UploadContent {
    /// Creates new upload content.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidArgument`] if `content` or `name` is empty.
    pub fn new(content: impl Into<Bytes>, name: impl Into<String>) -> UploadResult<Self> {
        let content = content.into();
        let name = name.into();

        if content.is_empty() {
            return Err(UploadError::invalid("no content to upload"));
        }
        if name.is_empty() {
            return Err(UploadError::invalid("no name for content"));
        }

        Ok(Self { content, name })
    }

    /// Creates upload content from optional parts.
    ///
    /// A missing part is treated like an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidArgument`] if either part is missing or empty.
    pub fn from_parts(content: Option<Bytes>, name: Option<String>) -> UploadResult<Self> {
        let content = content.ok_or_else(|| UploadError::invalid("no content to upload"))?;
        let name = name.ok_or_else(|| UploadError::invalid("no name for content"))?;
        Self::new(content, name)
    }

    /// Returns the payload.
    #[must_use]
    pub const fn content(&self) -> &Bytes {
        &self.content
    }

    /// Returns the logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consumes the content, returning `(content, name)`.
    #[must_use]
    pub fn into_parts(self) -> (Bytes, String) {
        (self.content, self.name)
    }
}
