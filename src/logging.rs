use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Serializes log lines from concurrent workers onto one sink so records
/// never interleave mid-line.
#[derive(Clone)]
pub(crate) struct LockedMakeWriter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LockedMakeWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }
}

impl<'a> MakeWriter<'a> for LockedMakeWriter {
    type Writer = LockedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LockedWriter {
            sink: self.sink.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one formatted event and hands it to the sink on drop.
pub(crate) struct LockedWriter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
    buf: Vec<u8>,
}

impl Write for LockedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| std::io::Error::other("log sink poisoned"))?;
        sink.write_all(&self.buf)?;
        sink.flush()?;
        self.buf.clear();
        Ok(())
    }
}

impl Drop for LockedWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

pub(crate) fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(LockedMakeWriter::stderr())
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
