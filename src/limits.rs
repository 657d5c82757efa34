//! Configurable limits for archive reading.

/// Resource limits applied by [`TarReader`] to GNU long name/link
/// annotations.
///
/// Annotation content is buffered in memory before the entry it belongs to
/// is returned, so a hostile archive could otherwise announce an arbitrarily
/// large long name.
///
/// # Example
///
/// ```
/// use startar::Limits;
///
/// let limits = Limits {
///     max_annotation_size: 64 * 1024,
///     ..Default::default()
/// };
/// assert_eq!(limits.max_pending_annotations, usize::MAX);
/// ```
///
/// [`TarReader`]: crate::TarReader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum content size of a single GNU long name or long link entry.
    ///
    /// Larger annotations fail with [`TarError::AnnotationTooLarge`] before
    /// anything is buffered.
    ///
    /// Default: 1 MiB.
    ///
    /// [`TarError::AnnotationTooLarge`]: crate::TarError::AnnotationTooLarge
    pub max_annotation_size: u64,

    /// Maximum number of annotations chained in front of one entry.
    ///
    /// Exceeding it fails with [`TarError::TooManyAnnotations`].
    ///
    /// Default: unlimited.
    ///
    /// [`TarError::TooManyAnnotations`]: crate::TarError::TooManyAnnotations
    pub max_pending_annotations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_annotation_size: 1024 * 1024, // 1 MiB
            max_pending_annotations: usize::MAX,
        }
    }
}

impl Limits {
    /// Create a new `Limits` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits that disable every check. Only for trusted archives.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_annotation_size: u64::MAX,
            max_pending_annotations: usize::MAX,
        }
    }

    /// Conservative limits for untrusted archives.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_annotation_size: 4096,
            max_pending_annotations: 16,
        }
    }
}
