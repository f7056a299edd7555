use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// 16 MB upload limit for media
pub const MAX_UPLOAD_SIZE: usize = 16 * 1024 * 1024;
pub const MAX_FILENAME_LEN: usize = 255;

/// Owner and group only.
#[cfg(unix)]
const DIR_MODE: u32 = 0o770;

/// Attempts at `name-N.ext` before giving up on a crowded directory.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("filename is empty after sanitization")]
    EmptyFilename,

    #[error("filename is longer than {MAX_FILENAME_LEN} bytes")]
    FilenameTooLong,

    #[error("file extension is not allowed")]
    DisallowedExtension,

    #[error("upload is empty")]
    Empty,

    #[error("upload exceeds {MAX_UPLOAD_SIZE} bytes")]
    TooLarge,

    #[error("no free file name left for {0}")]
    NameExhausted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A file written by [`UploadResolver::store`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    /// Forward-slash path under the upload root, e.g. `2016/04/09/cat.png`.
    pub relative: String,
    pub size: u64,
}

/// Places uploaded media under `{root}/{YYYY}/{MM}/{DD}/{name}`.
///
/// Partitioning by UTC day keeps directory fan-out bounded and makes a day
/// the natural unit for archival. Names are sanitized down to a single safe
/// path component, so nothing resolved here can leave the root.
pub struct UploadResolver {
    root: PathBuf,
    extensions: HashSet<String>,
}

impl UploadResolver {
    pub async fn new<I, S>(root: PathBuf, extensions: I) -> Result<Self, UploadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        create_private_dir(&root).await?;
        let extensions: HashSet<String> = extensions.into_iter().map(Into::into).collect();
        info!(
            "Upload root: {} (extensions: {})",
            root.display(),
            extensions.len()
        );
        Ok(Self { root, extensions })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True iff the text after the last `.` is a configured extension.
    /// Matching is case-sensitive.
    pub fn allowed(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.extensions.contains(ext))
    }

    /// The directory for `now`'s UTC date, created if missing.
    ///
    /// Safe to race: a directory created by a concurrent request is not an
    /// error.
    pub async fn directory_for(&self, now: DateTime<Utc>) -> Result<PathBuf, UploadError> {
        let dir = self
            .root
            .join(format!("{:04}", now.year()))
            .join(format!("{:02}", now.month()))
            .join(format!("{:02}", now.day()));

        create_private_dir(&dir).await?;
        Ok(dir)
    }

    /// Full destination path for `filename` uploaded at `now`.
    pub async fn resolve(&self, now: DateTime<Utc>, filename: &str) -> Result<PathBuf, UploadError> {
        let name = sanitize_filename(filename)?;
        let dir = self.directory_for(now).await?;
        Ok(dir.join(name))
    }

    /// Write `bytes` to a fresh file for `filename`.
    ///
    /// An existing file is never overwritten: on a clash the name gains a
    /// `-1`, `-2`, ... suffix before its extension.
    pub async fn store(
        &self,
        now: DateTime<Utc>,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(UploadError::TooLarge);
        }

        let name = sanitize_filename(filename)?;
        if !self.allowed(&name) {
            return Err(UploadError::DisallowedExtension);
        }

        let dir = self.directory_for(now).await?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = dir.join(numbered_name(&name, attempt));
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} taken, trying next name", candidate.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            write_or_discard(&mut file, &candidate, bytes).await?;

            let relative = self.relative_path(&candidate);
            info!("Stored upload {} ({} bytes)", relative, bytes.len());
            return Ok(StoredFile {
                path: candidate,
                relative,
                size: bytes.len() as u64,
            });
        }

        Err(UploadError::NameExhausted(name))
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Reduce a client-supplied name to one safe path component.
///
/// Directory separators and whitespace become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading dots and underscores are
/// trimmed so the result can be neither hidden nor `.`/`..`.
pub fn sanitize_filename(filename: &str) -> Result<String, UploadError> {
    let mut out = String::with_capacity(filename.len());
    for c in filename.chars() {
        match c {
            '/' | '\\' => out.push('_'),
            c if c.is_whitespace() => out.push('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => out.push(c),
            _ => {}
        }
    }

    let name = out.trim_start_matches(['.', '_']);
    if name.is_empty() {
        return Err(UploadError::EmptyFilename);
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(UploadError::FilenameTooLong);
    }
    Ok(name.to_string())
}

/// Write all of `bytes`, removing `path` if the write fails so no truncated
/// file is left holding the name.
async fn write_or_discard<W>(writer: &mut W, path: &Path, bytes: &[u8]) -> Result<(), UploadError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        warn!("Write to {} failed, discarding: {}", path.display(), e);
        if let Err(rm) = fs::remove_file(path).await {
            warn!("Could not remove partial upload {}: {}", path.display(), rm);
        }
        return Err(e.into());
    }
    Ok(())
}

fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, n, ext),
        _ => format!("{}-{}", name, n),
    }
}

async fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await
}
