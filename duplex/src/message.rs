//! Chat messages and end-of-session detection.
//!
//! A [`Message`] is one chunk of text on its way through the pipeline: a
//! keyboard read on its way to the socket, or a datagram on its way to the
//! screen. A chunk that contains the termination marker (a line holding only
//! `!`) ends the session; anything after the marker line is discarded.

use std::fmt;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_PAYLOAD: usize = 65_507;

/// The end-of-session line.
pub const TERMINATION_MARKER: &[u8] = b"!\n";

/// Result of scanning a chunk for the termination marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    /// Number of leading bytes of the chunk to keep.
    pub retained: usize,
    /// The chunk contains a standalone marker line.
    pub terminates: bool,
}

/// Looks for a standalone `!` line in `chunk`.
///
/// The marker counts only at the start of the chunk or directly after a line
/// break, and only when followed by `\n`. When found, everything up to and
/// including the marker is retained, except when the marker opens the chunk:
/// then nothing is retained and the chunk is a bare end-of-session signal.
///
/// ```
/// use duplex::message::scan;
///
/// assert_eq!(scan(b"hello\n!\nignored").retained, 8);
/// assert!(!scan(b"he!lo\n").terminates);
/// ```
#[must_use]
pub fn scan(chunk: &[u8]) -> Scan {
    let found = chunk
        .windows(TERMINATION_MARKER.len())
        .enumerate()
        .find(|&(i, window)| window == TERMINATION_MARKER && (i == 0 || chunk[i - 1] == b'\n'))
        .map(|(i, _)| i);

    match found {
        Some(0) => Scan {
            retained: 0,
            terminates: true,
        },
        Some(i) => Scan {
            retained: i + TERMINATION_MARKER.len(),
            terminates: true,
        },
        None => Scan {
            retained: chunk.len(),
            terminates: false,
        },
    }
}

/// A chunk of chat text, owned by exactly one queue or thread at a time.
///
/// Deliberately not `Clone`: moving a message is the only way to hand it on.
#[derive(PartialEq, Eq)]
pub struct Message {
    text: Vec<u8>,
    termination: bool,
}

impl Message {
    /// Builds a message from a raw chunk, cutting it after the termination
    /// marker if there is one.
    ///
    /// Chunks longer than [`MAX_PAYLOAD`] are truncated.
    #[must_use]
    pub fn from_chunk(chunk: &[u8]) -> Self {
        let chunk = &chunk[..chunk.len().min(MAX_PAYLOAD)];
        let Scan {
            retained,
            terminates,
        } = scan(chunk);
        Self {
            text: chunk[..retained].to_vec(),
            termination: terminates,
        }
    }

    /// The retained text.
    #[must_use]
    pub fn text(&self) -> &[u8] {
        &self.text
    }

    /// Returns `true` if this message ends the session.
    #[must_use]
    pub const fn is_termination(&self) -> bool {
        self.termination
    }

    /// Returns `true` for a message with no text that does not end the session.
    ///
    /// Such a message carries nothing worth sending or showing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && !self.termination
    }

    /// Bytes to put in the datagram.
    ///
    /// A termination message with no text still has to reach the peer, so it
    /// goes out as the bare marker.
    #[must_use]
    pub fn wire_bytes(&self) -> &[u8] {
        if self.termination && self.text.is_empty() {
            TERMINATION_MARKER
        } else {
            &self.text
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("text", &String::from_utf8_lossy(&self.text))
            .field("termination", &self.termination)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_marker_is_empty_termination() {
        let msg = Message::from_chunk(b"!\n");
        assert!(msg.is_termination());
        assert_eq!(msg.text(), b"");
        assert_eq!(msg.wire_bytes(), b"!\n");
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_marker_after_text_keeps_marker() {
        let msg = Message::from_chunk(b"hello\n!\n");
        assert!(msg.is_termination());
        assert_eq!(msg.text(), b"hello\n!\n");
        assert_eq!(msg.wire_bytes(), b"hello\n!\n");
    }

    #[test]
    fn test_marker_not_alone_on_line() {
        let msg = Message::from_chunk(b"he!lo\n");
        assert!(!msg.is_termination());
        assert_eq!(msg.text(), b"he!lo\n");

        assert!(!scan(b"hi !\n").terminates);
        assert!(!scan(b"!!\n").terminates);
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(
            scan(b"just chatting\nsecond line\n"),
            Scan {
                retained: 26,
                terminates: false
            }
        );
    }

    #[test]
    fn test_marker_without_line_break() {
        // The marker line needs its line break.
        assert!(!scan(b"bye\n!").terminates);
        assert!(!scan(b"!").terminates);
    }

    #[test]
    fn test_everything_after_marker_discarded() {
        let msg = Message::from_chunk(b"one\ntwo\n!\nthree\n!\n");
        assert!(msg.is_termination());
        assert_eq!(msg.text(), b"one\ntwo\n!\n");
    }

    #[test]
    fn test_leading_marker_discards_rest() {
        let msg = Message::from_chunk(b"!\nmore text\n");
        assert!(msg.is_termination());
        assert_eq!(msg.text(), b"");
    }

    #[test]
    fn test_oversized_chunk_truncated() {
        let chunk = vec![b'a'; MAX_PAYLOAD + 100];
        let msg = Message::from_chunk(&chunk);
        assert_eq!(msg.text().len(), MAX_PAYLOAD);
        assert!(!msg.is_termination());
    }

    #[test]
    fn test_empty_chunk() {
        let msg = Message::from_chunk(b"");
        assert!(msg.is_empty());
        assert!(!msg.is_termination());
    }
}
