use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};

use super::{Completion, CompletionKind, LinkError, Transport};
use crate::lifecycle::Link;
use crate::reactor::{ReactorHandle, Task};

/// Size of the fixed receive buffer every endpoint reads into
pub const RX_BUF_SIZE: usize = 512;

/// Where a pump posts its completions
#[derive(Debug, Clone)]
pub(crate) struct Poster {
    pub link: Link,
    pub session: u64,
    pub reactor: ReactorHandle,
}

impl Poster {
    fn post(&self, kind: CompletionKind) -> bool {
        self.reactor.post(Task::Io {
            link: self.link,
            completion: Completion { session: self.session, kind },
        })
    }
}

/// Reads into the fixed buffer and re-arms after every chunk until the
/// transport fails or the endpoint is cancelled.
pub(crate) async fn read_pump(
    mut reader: ReadHalf<Box<dyn Transport>>,
    poster: Poster,
    mut cancel: watch::Receiver<bool>,
) {
    let mut buf = [0u8; RX_BUF_SIZE];

    loop {
        let outcome = tokio::select! {
            res = reader.read(&mut buf) => res,
            _ = cancel.changed() => {
                poster.post(CompletionKind::Closed(LinkError::Aborted));
                return;
            }
        };

        match outcome {
            Ok(0) => {
                poster.post(CompletionKind::Closed(LinkError::Eof));
                return;
            }
            Ok(n) => {
                if !poster.post(CompletionKind::Read(buf[..n].to_vec())) {
                    return;
                }
            }
            Err(e) => {
                poster.post(CompletionKind::Closed(LinkError::from_io(e)));
                return;
            }
        }
    }
}

/// Executes the write operations an endpoint starts, one at a time, and
/// reports each completion. Shuts the write side down on exit.
pub(crate) async fn write_ops(
    mut writer: WriteHalf<Box<dyn Transport>>,
    mut ops: mpsc::UnboundedReceiver<Vec<u8>>,
    poster: Poster,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let chunk = tokio::select! {
            op = ops.recv() => match op {
                Some(chunk) => chunk,
                None => break,
            },
            _ = cancel.changed() => {
                poster.post(CompletionKind::Closed(LinkError::Aborted));
                break;
            }
        };

        let written = async {
            writer.write_all(&chunk).await?;
            writer.flush().await
        };

        let result = tokio::select! {
            res = written => res,
            _ = cancel.changed() => {
                poster.post(CompletionKind::Closed(LinkError::Aborted));
                break;
            }
        };

        match result {
            Ok(()) => {
                if !poster.post(CompletionKind::Wrote(chunk.len())) {
                    break;
                }
            }
            Err(e) => {
                poster.post(CompletionKind::Closed(LinkError::from_io(e)));
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        log::debug!("{} write side shutdown: {}", poster.link, e);
    }
}
