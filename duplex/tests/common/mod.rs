//! Stand-ins for the keyboard, the screen and the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use duplex::net::{Bind, Datagram, Transport};
use duplex::stdio::{Chunk, InputSource, Interrupt};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        duplex::init_tracing();
    });
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Default)]
struct Keys {
    pending: VecDeque<Vec<u8>>,
    closed: bool,
    interrupted: bool,
}

#[derive(Default)]
struct Keyboard {
    keys: Mutex<Keys>,
    changed: Condvar,
}

impl Keyboard {
    fn update(&self, f: impl FnOnce(&mut Keys)) {
        f(&mut self.keys.lock().unwrap());
        self.changed.notify_all();
    }
}

impl Interrupt for Keyboard {
    fn interrupt(&self) -> io::Result<()> {
        self.update(|keys| keys.interrupted = true);
        Ok(())
    }
}

/// Input source fed by the test. Blocks like a terminal until fed, closed or
/// interrupted.
pub struct ScriptedInput {
    keyboard: Arc<Keyboard>,
}

/// The test's side of a [`ScriptedInput`].
#[derive(Clone)]
pub struct Typist {
    keyboard: Arc<Keyboard>,
}

impl Typist {
    pub fn type_chunk(&self, chunk: &str) {
        let chunk = chunk.as_bytes().to_vec();
        self.keyboard.update(|keys| keys.pending.push_back(chunk));
    }

    /// Ends input, like Ctrl-D.
    pub fn close(&self) {
        self.keyboard.update(|keys| keys.closed = true);
    }
}

pub fn scripted_input() -> (ScriptedInput, Typist) {
    let keyboard = Arc::new(Keyboard::default());
    (
        ScriptedInput {
            keyboard: Arc::clone(&keyboard),
        },
        Typist { keyboard },
    )
}

impl InputSource for ScriptedInput {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        let keys = self.keyboard.keys.lock().unwrap();
        let mut keys = self
            .keyboard
            .changed
            .wait_while(keys, |k| k.pending.is_empty() && !k.closed && !k.interrupted)
            .unwrap();

        if keys.interrupted {
            return Ok(Chunk::Interrupted);
        }
        match keys.pending.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(Chunk::Data(chunk.len()))
            }
            None => Ok(Chunk::Eof),
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        self.keyboard.clone()
    }
}

/// Console writer the test can read back.
#[derive(Clone, Default)]
pub struct Screen(Arc<Mutex<Vec<u8>>>);

impl Screen {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Screen {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Wire {
    sent: Vec<Vec<u8>>,
    incoming: VecDeque<io::Result<Vec<u8>>>,
    interrupted: bool,
}

/// In-memory network: records what is sent, delivers what the test injects.
#[derive(Default)]
pub struct FakeNet {
    wire: Mutex<Wire>,
    changed: Condvar,
    binds: Mutex<usize>,
    send_delay: Mutex<Duration>,
}

impl FakeNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, datagram: &str) {
        let datagram = datagram.as_bytes().to_vec();
        self.wire.lock().unwrap().incoming.push_back(Ok(datagram));
        self.changed.notify_all();
    }

    pub fn fail_receive(&self, error: io::Error) {
        self.wire.lock().unwrap().incoming.push_back(Err(error));
        self.changed.notify_all();
    }

    pub fn sent(&self) -> Vec<String> {
        self.wire
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    /// Makes every later send take `per_send`, like a congested link.
    pub fn slow_down(&self, per_send: Duration) {
        *self.send_delay.lock().unwrap() = per_send;
    }

    pub fn binds(&self) -> usize {
        *self.binds.lock().unwrap()
    }

    pub fn binder(self: &Arc<Self>) -> Box<dyn Bind> {
        Box::new(FakeBinder(Arc::clone(self)))
    }
}

/// The transport handed to the endpoint. A fresh handle per bind, so the
/// endpoint's reference count only covers the session's own holders.
struct FakeSocket(Arc<FakeNet>);

impl Transport for FakeSocket {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        let delay = *self.0.send_delay.lock().unwrap();
        thread::sleep(delay);
        self.0.wire.lock().unwrap().sent.push(payload.to_vec());
        Ok(payload.len())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Datagram> {
        let net = &self.0;
        let wire = net.wire.lock().unwrap();
        let mut wire = net
            .changed
            .wait_while(wire, |w| w.incoming.is_empty() && !w.interrupted)
            .unwrap();

        if wire.interrupted {
            wire.interrupted = false;
            return Ok(Datagram::Interrupted);
        }
        match wire.incoming.pop_front() {
            Some(Ok(datagram)) => {
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(Datagram::Received(datagram.len()))
            }
            Some(Err(e)) => Err(e),
            None => Ok(Datagram::Interrupted),
        }
    }

    fn interrupt(&self) -> io::Result<()> {
        self.0.wire.lock().unwrap().interrupted = true;
        self.0.changed.notify_all();
        Ok(())
    }
}

struct FakeBinder(Arc<FakeNet>);

impl Bind for FakeBinder {
    fn bind(&self, _local_port: u16, _remote: SocketAddr) -> io::Result<Arc<dyn Transport>> {
        *self.0.binds.lock().unwrap() += 1;
        Ok(Arc::new(FakeSocket(Arc::clone(&self.0))))
    }
}
