//! Terminal side of the session: where typed text comes from and where
//! received text goes.
//!
//! [`StdinSource`] waits for keyboard input with `poll(2)` on stdin and on the
//! read end of a self-pipe. Writing a byte into the pipe through its
//! [`Interrupt`] handle wakes the reader so teardown never has to wait for the
//! user to press a key.

use std::fmt;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};

use rustix::event::{PollFd, PollFlags};
use rustix::io::Errno;

use crate::sync::lock;
use crate::trace::warn;

/// Outcome of one blocking input read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// This many bytes were written to the buffer.
    Data(usize),
    /// The input stream is closed.
    Eof,
    /// The read was woken through the source's [`Interrupt`] handle.
    Interrupted,
}

/// Wakes a thread blocked in a read from another thread.
pub trait Interrupt: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the wakeup could not be delivered.
    fn interrupt(&self) -> io::Result<()>;
}

/// Where the session's outgoing text comes from.
pub trait InputSource: Send {
    /// Blocks until input is available and reads one chunk of it.
    ///
    /// # Errors
    ///
    /// Returns the underlying read error.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk>;

    /// Handle that makes a pending or future [`read_chunk`](Self::read_chunk)
    /// return [`Chunk::Interrupted`].
    fn interrupter(&self) -> Arc<dyn Interrupt>;
}

/// Write end of the self-pipe.
struct PipeInterrupt {
    writer: OwnedFd,
}

impl Interrupt for PipeInterrupt {
    fn interrupt(&self) -> io::Result<()> {
        loop {
            match rustix::io::write(&self.writer, &[1]) {
                Ok(_) => return Ok(()),
                Err(Errno::INTR) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// The process's standard input.
pub struct StdinSource {
    wake: OwnedFd,
    interrupt: Arc<PipeInterrupt>,
}

impl StdinSource {
    /// # Errors
    ///
    /// Returns an error if the self-pipe cannot be created.
    pub fn new() -> io::Result<Self> {
        let (wake, writer) = rustix::pipe::pipe()?;
        Ok(Self {
            wake,
            interrupt: Arc::new(PipeInterrupt { writer }),
        })
    }
}

impl InputSource for StdinSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        let stdin = io::stdin();
        loop {
            // Level-triggered: a terminal hands out one line per read, and any
            // lines still pending are reported again on the next poll.
            let mut fds = [
                PollFd::new(&stdin, PollFlags::IN),
                PollFd::new(&self.wake, PollFlags::IN),
            ];
            match rustix::event::poll(&mut fds, -1) {
                Ok(_) => {}
                Err(Errno::INTR) => continue,
                Err(e) => return Err(e.into()),
            }
            if !fds[1].revents().is_empty() {
                return Ok(Chunk::Interrupted);
            }
            if fds[0].revents().is_empty() {
                continue;
            }

            return match rustix::io::read(&stdin, &mut *buf) {
                Ok(0) => Ok(Chunk::Eof),
                Ok(n) => Ok(Chunk::Data(n)),
                Err(Errno::INTR) => continue,
                Err(e) => Err(e.into()),
            };
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        self.interrupt.clone()
    }
}

/// Shared, line-flushed writer for everything the user sees.
///
/// Received text and session notices go through the same lock, so a notice
/// never lands in the middle of a message.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    /// Console on the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes `text` verbatim and flushes.
    ///
    /// # Errors
    ///
    /// Returns the writer's error.
    pub fn write_text(&self, text: &[u8]) -> io::Result<()> {
        let mut out = lock(&self.out);
        out.write_all(text)?;
        out.flush()
    }

    /// Prints one line of session information. Write errors are logged and
    /// otherwise ignored.
    pub fn notice(&self, line: impl fmt::Display) {
        let mut out = lock(&self.out);
        if let Err(_e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %_e, "failed to write notice");
        }
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_interleaves_whole_writes() {
        let capture = Capture::default();
        let console = Console::new(capture.clone());

        console.write_text(b"hi\n").unwrap();
        console.notice("**dropped**");
        console.clone().write_text(b"there\n").unwrap();

        assert_eq!(
            String::from_utf8(capture.0.lock().unwrap().clone()).unwrap(),
            "hi\n**dropped**\nthere\n"
        );
    }

    #[test]
    fn test_pipe_interrupt_is_readable() {
        let source = StdinSource::new().unwrap();
        source.interrupter().interrupt().unwrap();

        let mut fds = [PollFd::new(&source.wake, PollFlags::IN)];
        assert_eq!(rustix::event::poll(&mut fds, 0).unwrap(), 1);
    }
}
