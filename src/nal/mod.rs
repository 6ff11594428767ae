//! H.264 Annex-B NAL unit framer.
//!
//! A pure byte-stream parser: consumes a device's raw Annex-B output and
//! emits one NAL unit at a time, each still carrying its original start
//! code. The framer does not group NALs into frames or access units —
//! consumers of its output operate per-NAL.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read chunk size; arbitrary, only affects syscall count.
const READ_CHUNK: usize = 8192;

/// A framer gives up and reports corruption (`FramerCorrupted`) once it
/// has buffered this many bytes without locating a start code, rather
/// than buffering unboundedly.
const MAX_GARBAGE_BYTES: usize = 1 << 20;

/// Minimal 3-byte Annex-B start code sequence
const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

#[derive(Debug, Error)]
pub enum FramerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no start code found within {0} bytes")]
    NoStartCode(usize),
}

/// One NAL unit, including its original start code.
#[derive(Debug, Clone)]
pub struct NalUnit {
    pub data: Bytes,
}

impl NalUnit {
    fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Length in bytes of the leading start code (3 or 4).
    pub fn start_code_len(&self) -> usize {
        if self.data.len() >= 4 && self.data[0..4] == [0x00, 0x00, 0x00, 0x01] {
            4
        } else {
            3
        }
    }

    /// The one-byte NAL header immediately following the start code.
    pub fn header_byte(&self) -> Option<u8> {
        self.data.get(self.start_code_len()).copied()
    }

    /// `nal_type` is the low 5 bits of the header byte.
    pub fn nal_type(&self) -> Option<u8> {
        self.header_byte().map(|b| b & 0x1F)
    }

    pub fn is_sps(&self) -> bool {
        self.nal_type() == Some(7)
    }

    pub fn is_pps(&self) -> bool {
        self.nal_type() == Some(8)
    }

    pub fn is_idr(&self) -> bool {
        self.nal_type() == Some(5)
    }
}

/// Locates the earliest start code at or after `from`, returning
/// `(index, start_code_len)`. Per the Annex-B emulation-prevention
/// guarantee, the literal byte sequence `00 00 01` cannot occur inside
/// valid RBSP payload except as a start code, so greedily absorbing one
/// leading zero byte to distinguish a 3- from a 4-byte start code is safe.
/// Only used to locate where a fresh unit begins (`from == 0`); closing
/// off the unit currently being assembled goes through
/// `find_next_boundary` instead, which does not perform this absorption.
fn find_start_code(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    if buf.len() < from + START_CODE_3.len() {
        return None;
    }
    let mut i = from;
    while i + START_CODE_3.len() <= buf.len() {
        if buf[i..i + 3] == START_CODE_3 {
            if i >= 1 && buf[i - 1] == 0x00 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

/// Locates the minimal 3-byte start code that closes the unit currently
/// being assembled, searching at or after byte 4 (past our own start
/// code, so it is never re-matched). Returns `(unit_end, next_start)`:
/// `unit_end` is where the current unit's bytes stop, `next_start` is
/// where the following unit's start code begins. Any zero bytes strictly
/// between the two are inter-NAL filler — not part of either unit — the
/// caller discards them rather than folding them into the next unit's
/// start code as a spurious 4-byte form.
fn find_next_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    const FROM: usize = 4;
    if buf.len() < FROM + START_CODE_3.len() {
        return None;
    }
    let mut i = FROM;
    while i + START_CODE_3.len() <= buf.len() {
        if buf[i..i + 3] == START_CODE_3 {
            let mut end = i;
            while end > FROM && buf[end - 1] == 0x00 {
                end -= 1;
            }
            return Some((end, i));
        }
        i += 1;
    }
    None
}

/// A framer owns a single device byte stream for the lifetime of one
/// capture session. On session restart a fresh framer is created — no
/// partial-NAL state survives a restart.
pub struct NalFramer<R> {
    reader: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> NalFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK * 2),
            eof: false,
        }
    }

    /// Returns the next NAL unit, `Ok(None)` at clean end of stream, or
    /// `Err` if corruption is detected.
    pub async fn next_unit(&mut self) -> Result<Option<NalUnit>, FramerError> {
        loop {
            if let Some((first, _)) = find_start_code(&self.buf, 0) {
                if first > 0 {
                    // garbage before the first start code is silently discarded
                    self.buf.advance(first);
                }

                // search for the *next* boundary, skipping past our own
                // start code (max 4 bytes) so we never re-match it.
                match find_next_boundary(&self.buf) {
                    Some((unit_end, next_start)) => {
                        let unit = self.buf.split_to(unit_end).freeze();
                        let filler = next_start - unit_end;
                        if filler > 0 {
                            self.buf.advance(filler);
                        }
                        return Ok(Some(NalUnit::new(unit)));
                    }
                    None if self.eof => {
                        if self.buf.is_empty() {
                            return Ok(None);
                        }
                        let unit = self.buf.split_to(self.buf.len()).freeze();
                        return Ok(Some(NalUnit::new(unit)));
                    }
                    None => {
                        if self.buf.len() > MAX_GARBAGE_BYTES {
                            return Err(FramerError::NoStartCode(self.buf.len()));
                        }
                        self.fill().await?;
                    }
                }
            } else if self.eof {
                // trailing bytes never resolved into a start code at all
                self.buf.clear();
                return Ok(None);
            } else {
                // keep a short tail (a partial start code straddling the
                // next read) and discard the rest as garbage
                if self.buf.len() > 3 {
                    let keep_from = self.buf.len() - 3;
                    self.buf.advance(keep_from);
                }
                if self.buf.len() > MAX_GARBAGE_BYTES {
                    return Err(FramerError::NoStartCode(self.buf.len()));
                }
                self.fill().await?;
            }
        }
    }

    async fn fill(&mut self) -> Result<(), FramerError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.reader.read(&mut chunk).await?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn collect(input: &[u8]) -> Vec<Vec<u8>> {
        let mut framer = NalFramer::new(Cursor::new(input.to_vec()));
        let mut out = Vec::new();
        while let Some(unit) = framer.next_unit().await.unwrap() {
            out.push(unit.data.to_vec());
        }
        out
    }

    #[tokio::test]
    async fn single_nal_with_4_byte_start_code() {
        let input = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A];
        let units = collect(&input).await;
        assert_eq!(units, vec![input.to_vec()]);
    }

    #[tokio::test]
    async fn two_consecutive_nals() {
        let mut input = vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A];
        input.extend_from_slice(&[0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]);
        let units = collect(&input).await;
        assert_eq!(units.len(), 2);
        assert_eq!(units[0], vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A]);
        assert_eq!(units[1], vec![0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]);
    }

    #[tokio::test]
    async fn leading_garbage_is_discarded() {
        let mut input = vec![0xDE, 0xAD, 0xBE, 0xEF];
        input.extend_from_slice(&[0x00, 0x00, 0x01, 0x65, 0x88]);
        let units = collect(&input).await;
        assert_eq!(units, vec![vec![0x00, 0x00, 0x01, 0x65, 0x88]]);
    }

    #[tokio::test]
    async fn nal_type_is_low_5_bits_of_header() {
        // header byte 0x67 = 0b0110_0111 -> type 7 (SPS)
        let input = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A];
        let mut framer = NalFramer::new(Cursor::new(input.to_vec()));
        let unit = framer.next_unit().await.unwrap().unwrap();
        assert_eq!(unit.nal_type(), Some(7));
        assert!(unit.is_sps());
    }

    #[tokio::test]
    async fn start_code_straddling_buffer_boundary() {
        // bytes `00 00 01 67 ...` split mid-start-code across two reads,
        // modeled as a single concatenated input since Cursor reads in one
        // shot; the split-read case is covered by `split_read_reader` below.
        let input = [0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A];
        let units = collect(&input).await;
        assert_eq!(units, vec![input.to_vec()]);
    }

    struct ChunkedReader {
        chunks: Vec<Vec<u8>>,
        idx: usize,
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.idx < self.chunks.len() {
                let chunk = self.chunks[self.idx].clone();
                buf.put_slice(&chunk);
                self.idx += 1;
            }
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn split_reads_produce_two_nals() {
        // start code straddles the boundary between the two reads
        let chunks = vec![
            vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A, 0x00],
            vec![0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80],
        ];
        let mut framer = NalFramer::new(ChunkedReader { chunks, idx: 0 });
        let first = framer.next_unit().await.unwrap().unwrap();
        let second = framer.next_unit().await.unwrap().unwrap();
        assert_eq!(
            first.data.to_vec(),
            vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x0A]
        );
        assert_eq!(
            second.data.to_vec(),
            vec![0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]
        );
        assert!(framer.next_unit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_stream_yields_no_units() {
        let units = collect(&[]).await;
        assert!(units.is_empty());
    }
}
