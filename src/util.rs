//! Small string helpers for handlers: URL form-coding, HTML escaping,
//! and random token material.

use rand::Rng;

/// URL-encode UTF-8 text, form style: unreserved bytes pass through,
/// space becomes `+`, everything else becomes `%XX`.
#[must_use]
pub fn encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Decode URL form-encoded text: `+` becomes space, `%XX` becomes the
/// byte. Malformed escapes are kept verbatim rather than rejected.
#[must_use]
pub fn decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                out.push(hex_to_digit(bytes[i + 1]) * 16 + hex_to_digit(bytes[i + 2]));
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_to_digit(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Escape text destined for HTML element content: `&`, `<`, `>`.
///
/// Text going inside an attribute needs [`safe_attr`] as well.
#[must_use]
pub fn safe_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape text destined for an HTML attribute value: `"` and `'`.
#[must_use]
pub fn safe_attr(input: &str) -> String {
    input.replace('"', "&quot;").replace('\'', "&apos;")
}

/// Alphanumeric random string from the OS RNG, suitable for session
/// token material.
#[must_use]
pub fn generate_secure_random_string(length: usize) -> String {
    const ALLOWED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALLOWED[rng.gen_range(0..ALLOWED.len())] as char)
        .collect()
}
