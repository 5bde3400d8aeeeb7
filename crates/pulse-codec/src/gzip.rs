//! Gzip framing with reusable compressor state.
//!
//! Compressors carry a sizeable deflate window, so finished compressors are
//! parked in a small pool and `reset` for the next payload instead of being
//! rebuilt. Set `GZIP_POOL=0` (or `false`) before startup to disable the
//! pool and allocate a fresh compressor per payload.

use std::io::Read;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use parking_lot::Mutex;

use crate::error::CodecError;

/// Magic, deflate method, no flags, zero mtime, no extra flags, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

const POOL_LIMIT: usize = 8;

static POOL: Mutex<Vec<Compress>> = Mutex::new(Vec::new());
static POOL_ENABLED: OnceLock<bool> = OnceLock::new();

fn pool_enabled() -> bool {
    *POOL_ENABLED.get_or_init(|| match std::env::var("GZIP_POOL") {
        Ok(v) => v != "0" && !v.eq_ignore_ascii_case("false"),
        Err(_) => true,
    })
}

fn take_compressor() -> Compress {
    if pool_enabled() {
        if let Some(mut comp) = POOL.lock().pop() {
            comp.reset();
            return comp;
        }
    }
    Compress::new(Compression::best(), false)
}

fn park_compressor(comp: Compress) {
    if pool_enabled() {
        let mut pool = POOL.lock();
        if pool.len() < POOL_LIMIT {
            pool.push(comp);
        }
    }
}

/// Compresses `data` into a complete gzip stream.
///
/// # Errors
///
/// Returns `CodecError::Gzip` when the deflate stream cannot be produced.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut comp = take_compressor();

    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    out.extend_from_slice(&GZIP_HEADER);

    let mut consumed = 0usize;
    loop {
        out.reserve(8 * 1024);
        let before = comp.total_in();
        let status = comp
            .compress_vec(&data[consumed..], &mut out, FlushCompress::Finish)
            .map_err(|e| CodecError::Gzip(std::io::Error::other(e)))?;
        consumed += usize::try_from(comp.total_in() - before).unwrap_or(0);
        if matches!(status, Status::StreamEnd) {
            break;
        }
    }

    let mut crc = Crc::new();
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());

    park_compressor(comp);
    Ok(out)
}

/// Decompresses a gzip stream, validating the trailing checksum.
///
/// # Errors
///
/// Returns `CodecError::Gzip` for truncated, corrupt or non-gzip input.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Reports whether a `Content-Encoding` header value names gzip.
#[must_use]
pub fn is_gzip_encoding(header_value: &str) -> bool {
    header_value
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("gzip"))
}
