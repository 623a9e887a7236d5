//! Audio format classification.
//!
//! Pure decision functions over filenames. The transcode verdict is a hard
//! branch in the import pipeline: it selects which gateway endpoint is
//! invoked, so it must be total and deterministic for every supported
//! extension.

/// File extensions recognized as importable audio.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "m4a", "flac", "aac", "ogg", "wma", "aif", "aiff",
];

/// Extensions that must pass through the transcode endpoint before storage.
///
/// Lossless and legacy containers are converted to a compressed target so
/// every stored track is directly playable.
pub const MUST_TRANSCODE_EXTENSIONS: &[&str] = &["wav", "aif", "aiff", "flac", "ogg", "wma"];

/// Extract the lowercased extension of a filename, if any.
#[must_use]
pub fn audio_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Check whether a filename carries a supported audio extension.
#[must_use]
pub fn is_audio_file(name: &str) -> bool {
    audio_extension(name)
        .is_some_and(|ext| SUPPORTED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Decide whether a file must be transcoded before it can be stored.
///
/// Returns `true` for members of [`MUST_TRANSCODE_EXTENSIONS`]. Compressed
/// formats and unknown extensions pass through unchanged.
#[must_use]
pub fn needs_transcode(name: &str) -> bool {
    audio_extension(name)
        .is_some_and(|ext| MUST_TRANSCODE_EXTENSIONS.contains(&ext.as_str()))
}

/// Derive the display name for a source path (final path segment).
#[must_use]
pub fn display_name(path: &str) -> String {
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Strip the extension from a filename, for use as a default track title.
#[must_use]
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
