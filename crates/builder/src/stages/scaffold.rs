use futures::future::try_join_all;
use modsmith_errors::Error;
use modsmith_platform::{Platform, PlatformContext};

use crate::description::Directories;

/// Create every support directory of the build root concurrently.
///
/// The module directory is left to the fetcher.
pub(crate) async fn scaffold(
    platform: &Platform,
    ctx: &PlatformContext,
    directories: &Directories,
) -> Result<(), Error> {
    let fs = platform.filesystem();
    try_join_all(
        directories
            .scaffolded()
            .into_iter()
            .map(|dir| fs.ensure_dir(ctx, dir)),
    )
    .await?;
    Ok(())
}
