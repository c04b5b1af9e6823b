//! Gzip compression of the spooled tar archive

use modsmith_errors::Error;
use std::path::Path;

use super::create_fresh;

/// Compress a tar file with gzip using async-compression
///
/// # Errors
///
/// Returns an error if file I/O operations fail or compression fails.
pub async fn compress_with_gzip(tar_path: &Path, output_path: &Path) -> Result<(), Error> {
    use async_compression::tokio::write::GzipEncoder;
    use tokio::fs::File;
    use tokio::io::{AsyncWriteExt, BufReader};

    let input_file = File::open(tar_path)
        .await
        .map_err(|e| Error::io_with_path(&e, tar_path))?;
    let output_file = create_fresh(output_path).await?;

    let mut encoder = GzipEncoder::new(output_file);
    let mut reader = BufReader::new(input_file);
    tokio::io::copy(&mut reader, &mut encoder).await?;

    // Flushes the gzip trailer
    encoder.shutdown().await?;

    Ok(())
}
