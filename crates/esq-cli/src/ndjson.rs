//! ✂️ NDJSON file handling for `esq bulk`: gunzip if needed, then one document per line.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use memchr::memchr_iter;

/// 📦 File bytes, decompressed when the name ends in `.gz`.
pub(crate) fn decode(path: &Path, raw: Vec<u8>) -> Result<Vec<u8>> {
    let gzipped = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if !gzipped {
        return Ok(raw);
    }
    let mut inflated = Vec::with_capacity(raw.len() * 4);
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut inflated)
        .with_context(|| format!("💀 '{}' ends in .gz but would not gunzip.", path.display()))?;
    Ok(inflated)
}

/// ✂️ Non-blank lines, `\r` trimmed, each paired with the byte count it consumed.
///
/// Terminators and blank lines count too: they are charged to the next real line (trailing
/// ones to the last), so the counts always add up to `bytes.len()` and a progress bar fed
/// with them lands on 100%.
pub(crate) fn lines(bytes: &[u8]) -> Result<Vec<(&str, usize)>> {
    let mut out: Vec<(&str, usize)> = Vec::new();
    let mut start = 0;
    let mut pending = 0;
    for end in memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len())) {
        pending += (end + 1).min(bytes.len()) - start;
        let line = &bytes[start..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.iter().all(u8::is_ascii_whitespace) {
            let text = std::str::from_utf8(line)
                .with_context(|| format!("💀 Line starting at byte {start} is not UTF-8."))?;
            out.push((text, std::mem::take(&mut pending)));
        }
        start = end + 1;
    }
    // -- 🧹 trailing blank lines ride along with the last document
    if let Some(last) = out.last_mut() {
        last.1 += pending;
    }
    Ok(out)
}
