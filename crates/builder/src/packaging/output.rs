use modsmith_errors::Error;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

/// The packaged module as a readable gzip stream.
///
/// Backed by the spooled archive; a private spool directory is removed
/// when the output is dropped.
#[derive(Debug)]
pub struct BuildOutput {
    path: PathBuf,
    file: File,
    spool: Option<TempDir>,
}

impl BuildOutput {
    /// Open a spooled archive for reading
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: PathBuf) -> Result<Self, Error> {
        let file = File::open(&path)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?;
        Ok(Self {
            path,
            file,
            spool: None,
        })
    }

    pub(crate) async fn spooled(path: PathBuf, spool: TempDir) -> Result<Self, Error> {
        let mut output = Self::open(path).await?;
        output.spool = Some(spool);
        Ok(output)
    }

    /// Location of the spooled archive
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the archive in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub async fn len(&self) -> Result<u64, Error> {
        Ok(self.file.metadata().await?.len())
    }
}

impl AsyncRead for BuildOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}
