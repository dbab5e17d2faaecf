//! Deflate (zlib) body compression with session-owned scratch buffers.
//!
//! One codec instance lives inside each session, reusing its low-level
//! [`flate2`] state and a pre-allocated inflate scratch buffer so
//! steady-state operation performs no per-message buffer allocation.
//! Malformed deflate input is reported as a decompression error, never as a
//! panic or an unrelated low-level failure.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{FramewireError, Result};

/// Extra output space reserved per compression round; deflate needs slack
/// even for incompressible input.
const COMPRESS_SLACK: usize = 64;

/// Session-scoped deflate transform.
pub struct DeflateCodec {
    deflater: Compress,
    inflater: Decompress,
    /// Inflate output scratch; capacity fixed at the maximum message size.
    scratch: Vec<u8>,
    max_payload: usize,
}

impl DeflateCodec {
    /// Create a codec whose inflated output is capped at `max_payload`
    /// bytes.
    pub fn new(max_payload: usize) -> Self {
        Self {
            deflater: Compress::new(Compression::default(), true),
            inflater: Decompress::new(true),
            scratch: Vec::with_capacity(max_payload),
            max_payload,
        }
    }

    /// Compress `text` into `out` (cleared first), replacing its previous
    /// contents. `out` is caller-owned so the compressed bytes can live in
    /// the session's outgoing staging area.
    pub fn compress(&mut self, text: &str, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        self.deflater.reset();

        let mut input = text.as_bytes();
        loop {
            out.reserve(input.len() + input.len() / 1000 + COMPRESS_SLACK);
            let before = self.deflater.total_in() as usize;
            let status = self
                .deflater
                .compress_vec(input, out, FlushCompress::Finish)
                .map_err(|e| FramewireError::Compression(e.to_string()))?;
            let consumed = self.deflater.total_in() as usize - before;
            input = &input[consumed..];

            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok | Status::BufError => {},
            }
        }
    }

    /// Inflate `data` back into message text.
    ///
    /// Fails on corrupt streams, on truncated streams, on inflated output
    /// exceeding the configured maximum, and on non-UTF-8 plaintext.
    pub fn decompress(&mut self, data: &[u8]) -> Result<String> {
        self.scratch.clear();
        self.inflater.reset(true);

        let mut input = data;
        loop {
            let before = self.inflater.total_in() as usize;
            let status = self
                .inflater
                .decompress_vec(input, &mut self.scratch, FlushDecompress::Finish)
                .map_err(|e| FramewireError::Decompression(e.to_string()))?;
            let consumed = self.inflater.total_in() as usize - before;
            input = &input[consumed..];

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if self.scratch.len() >= self.max_payload {
                        return Err(FramewireError::Decompression(format!(
                            "inflated content exceeds maximum message size {}",
                            self.max_payload
                        )));
                    }
                    if input.is_empty() {
                        return Err(FramewireError::Decompression(
                            "truncated deflate stream".to_string(),
                        ));
                    }
                },
            }
        }

        std::str::from_utf8(&self.scratch)
            .map(str::to_owned)
            .map_err(|e| FramewireError::Decompression(format!("inflated text is not UTF-8: {e}")))
    }
}
