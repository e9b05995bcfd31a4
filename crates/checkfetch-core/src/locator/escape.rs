//! Percent-escaping of locator addresses.

/// Characters left untouched besides ASCII alphanumerics. `%` is in the set,
/// so escaping an escaped address is a no-op.
pub const ALLOWED_URI_CHARS: &str = "@#&=*+-_.,:!?()/~'%;$";

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

fn is_allowed(b: u8) -> bool {
    b.is_ascii_alphanumeric() || ALLOWED_URI_CHARS.as_bytes().contains(&b)
}

/// Percent-escape every byte of the UTF-8 encoding of `input` that is not
/// alphanumeric or in [`ALLOWED_URI_CHARS`].
pub fn escape_address(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if is_allowed(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX_UPPER[(b >> 4) as usize] as char);
            out.push(HEX_UPPER[(b & 0x0f) as usize] as char);
        }
    }
    out
}
