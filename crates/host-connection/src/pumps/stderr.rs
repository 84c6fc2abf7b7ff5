//! Forwards the host's stderr into the log.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Logs every line the host writes to stderr until it closes the stream.
pub(crate) async fn stderr_pump<R>(stderr: R, host: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(host = %host, "native host: {line}");
    }
}
