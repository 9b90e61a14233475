use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Render bytes as offset-prefixed hex lines for postmortem logging.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / BYTES_PER_LINE * 8);
    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:08x}:", line * BYTES_PER_LINE);
        for byte in chunk {
            let _ = write!(out, " {byte:02x}");
        }
    }
    out
}
