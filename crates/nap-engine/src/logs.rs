//! Demultiplexing of attached container output.
//!
//! Non-TTY log and exec streams interleave stdout and stderr as frames with
//! an 8-byte header: stream type, three zero bytes, then the payload length
//! as a big-endian `u32`.

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
pub struct Demuxer {
    buf: Vec<u8>,
}

impl Demuxer {
    /// Feed a chunk; returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<(StreamKind, Vec<u8>)> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while self.buf.len() >= HEADER_LEN {
            let len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
            if self.buf.len() < HEADER_LEN + len {
                break;
            }
            let kind = match self.buf[0] {
                0 => StreamKind::Stdin,
                2 => StreamKind::Stderr,
                _ => StreamKind::Stdout,
            };
            let payload = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
            self.buf.drain(..HEADER_LEN + len);
            frames.push((kind, payload));
        }
        frames
    }

    /// Bytes of an incomplete trailing frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Collected output of a finished exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![kind, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn splits_interleaved_streams() {
        let mut bytes = frame(1, b"hello\n");
        bytes.extend(frame(2, b"oops\n"));
        let frames = Demuxer::default().push(&bytes);
        assert_eq!(
            frames,
            vec![
                (StreamKind::Stdout, b"hello\n".to_vec()),
                (StreamKind::Stderr, b"oops\n".to_vec()),
            ]
        );
    }

    #[test]
    fn waits_for_partial_frames() {
        let bytes = frame(1, b"split payload");
        let mut demux = Demuxer::default();
        assert!(demux.push(&bytes[..5]).is_empty());
        assert!(demux.push(&bytes[5..12]).is_empty());
        assert_eq!(demux.pending(), 12);
        let frames = demux.push(&bytes[12..]);
        assert_eq!(frames, vec![(StreamKind::Stdout, b"split payload".to_vec())]);
        assert_eq!(demux.pending(), 0);
    }
}
