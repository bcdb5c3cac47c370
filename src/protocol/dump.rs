//! Hex + ASCII rendering of raw buffers for diagnostics.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Bytes rendered per line.
const BYTES_PER_LINE: usize = 16;

/// Width of the hex column before the ASCII column.
const HEX_COLUMN_WIDTH: usize = 40;

/// Render `data` as hex + ASCII, 16 bytes per line.
///
/// Hex digits are grouped by 4 bytes. Non-printable bytes show as `.` in the
/// ASCII column.
///
/// ```
/// use iproto_client::protocol::hex_dump;
///
/// let out = hex_dump(b"ping");
/// assert_eq!(out, format!(" 70696E67{}\tping\n", " ".repeat(31)));
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 8);

    for line in data.chunks(BYTES_PER_LINE) {
        let start = out.len();
        for (i, &byte) in line.iter().enumerate() {
            if i % 4 == 0 {
                out.push(' ');
            }
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0xF) as usize] as char);
        }
        let written = out.len() - start;
        for _ in written..HEX_COLUMN_WIDTH {
            out.push(' ');
        }
        out.push('\t');
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }

    out
}
