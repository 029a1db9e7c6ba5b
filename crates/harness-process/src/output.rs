//! Child output capture.
//!
//! Every supervised process gets one capture task per stream. Chunks are
//! accumulated into in-memory buffers for the lifetime of the process (for
//! diagnostics) and forwarded as events to the readiness synchronizer,
//! independent of whether they are echoed to the parent console.

use parking_lot::Mutex;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use harness_common::StreamType;

/// Raw lifecycle events forwarded from the capture and exit-monitor tasks
/// to the readiness synchronizer.
#[derive(Debug)]
pub(crate) enum OutputEvent {
    /// A chunk of bytes arrived on the given stream.
    Chunk(StreamType),
    /// The child exited and both streams have drained.
    Exited(ExitStatus),
    /// The child's exit status could not be observed.
    WaitFailed,
}

/// Accumulated output of one stream, shared between the capture task and
/// everyone holding the process handle.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<String>>);

impl OutputBuffer {
    pub(crate) fn push(&self, text: &str) {
        self.0.lock().push_str(text);
    }

    /// Copy of everything captured so far.
    pub fn snapshot(&self) -> String {
        self.0.lock().clone()
    }
}

/// Read a stream chunk-wise until EOF, buffering, echoing and signaling
/// each chunk.
pub(crate) fn spawn_capture_task(
    mut stream: impl AsyncRead + Unpin + Send + 'static,
    stream_type: StreamType,
    buffer: OutputBuffer,
    events: UnboundedSender<OutputEvent>,
    silent: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&chunk[..n]);
                    buffer.push(&text);
                    // The receiver goes away once readiness is resolved.
                    let _ = events.send(OutputEvent::Chunk(stream_type));
                    if !silent {
                        echo(stream_type, &text);
                    }
                }
                Err(e) => {
                    debug!(stream = %stream_type, error = %e, "output stream read failed");
                    break;
                }
            }
        }
    })
}

/// Relay child output to the parent console, indented so it reads as child
/// output rather than harness logging.
fn echo(stream: StreamType, text: &str) {
    for line in text.split(['\n', '\r']).filter(|l| !l.is_empty()) {
        match stream {
            StreamType::Stdout => println!("  {line}"),
            StreamType::Stderr => eprintln!("  {line}"),
        }
    }
}
