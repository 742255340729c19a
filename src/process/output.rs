use crate::process::types::OutputKind;
use crate::process::Process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Receives every complete output line of a supervised process
///
/// Called as `handler(kind, line, process)` with the trailing newline
/// stripped. Lines of one stream arrive in production order; stdout and
/// stderr are read independently and may interleave arbitrarily.
pub type OutputHandler = Arc<dyn Fn(OutputKind, &str, &Process) + Send + Sync>;

/// Background task reading one stream of a process until EOF
///
/// Read errors are logged and reading goes on; the pipe stays open so the
/// child never sees EPIPE because of a failed read.
pub(crate) async fn forward_lines<R>(
    kind: OutputKind,
    stream: R,
    process: Arc<Process>,
    handler: OutputHandler,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                handler(kind, line, process.as_ref());
            }
            Err(e) => {
                tracing::warn!(
                    process = %process.name(),
                    stream = %kind,
                    "Failed to read process output: {}",
                    e
                );
            }
        }
    }
}
