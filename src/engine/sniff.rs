//! Media-type sniffing over the first bytes of a response body.
//!
//! A compact signature table in the spirit of the standard HTTP sniffing
//! algorithm: byte-order marks first, then magic-byte signatures (markup gets
//! leading-whitespace tolerance), then a control-byte scan that decides
//! between text and opaque binary. Always returns a type, so a missing or
//! wrong `Content-Type` header can be compared against something.

/// Media types are compared on the bare type/subtype; everything from the
/// first `;` on is a parameter.
pub fn strip_parameters(content_type: &str) -> &str {
    match content_type.find(';') {
        Some(idx) => content_type[..idx].trim(),
        None => content_type.trim(),
    }
}

/// Sniffs a media type from up to the first ~512 bytes of a body.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(512)];

    // Byte-order marks decide text immediately.
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return "text/plain; charset=utf-8";
    }
    if data.starts_with(&[0xFE, 0xFF]) {
        return "text/plain; charset=utf-16be";
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        return "text/plain; charset=utf-16le";
    }

    // Markup signatures tolerate leading whitespace.
    let trimmed = skip_ws(data);
    for tag in HTML_TAGS {
        if matches_tag(trimmed, tag) {
            return "text/html; charset=utf-8";
        }
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    // Exact magic-byte signatures.
    for (magic, mime) in MAGIC {
        if data.starts_with(magic) {
            return mime;
        }
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return "image/webp";
    }

    // No signature: text unless a control byte says otherwise.
    if data.iter().any(|&b| is_binary_byte(b)) {
        "application/octet-stream"
    } else {
        "text/plain; charset=utf-8"
    }
}

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

const MAGIC: &[(&[u8], &'static str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "image/png"),
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (b"PK\x03\x04", "application/zip"),
    (&[0x1F, 0x8B, 0x08], "application/x-gzip"),
    (b"OggS", "application/ogg"),
    (&[0x00, 0x00, 0x01, 0x00], "image/x-icon"),
    (b"BM", "image/bmp"),
];

fn skip_ws(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag match followed by a tag-terminating byte.
fn matches_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() {
        return false;
    }
    if !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

fn is_binary_byte(b: u8) -> bool {
    b <= 0x08
        || b == 0x0B
        || (0x0E..=0x1A).contains(&b)
        || (0x1C..=0x1F).contains(&b)
        || b == 0x7F
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parameters() {
        assert_eq!(strip_parameters("text/html; charset=utf-8"), "text/html");
        assert_eq!(strip_parameters("text/plain"), "text/plain");
        assert_eq!(strip_parameters("  image/png ; x=y"), "image/png");
        assert_eq!(strip_parameters(""), "");
    }

    #[test]
    fn sniffs_html_with_leading_whitespace() {
        assert_eq!(
            detect_content_type(b"\n\t <!doctype html><html>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(detect_content_type(b"<HTML>"), "text/html; charset=utf-8");
        // `<htmlx` is not a tag boundary.
        assert_ne!(detect_content_type(b"<htmlx"), "text/html; charset=utf-8");
    }

    #[test]
    fn sniffs_images_and_archives() {
        assert_eq!(
            detect_content_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2]),
            "image/png"
        );
        assert_eq!(detect_content_type(b"GIF89a......"), "image/gif");
        assert_eq!(detect_content_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_content_type(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(detect_content_type(b"%PDF-1.7"), "application/pdf");
    }

    #[test]
    fn bom_wins_over_everything() {
        assert_eq!(
            detect_content_type(&[0xEF, 0xBB, 0xBF, b'<', b'h', b't', b'm', b'l', b'>']),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn plain_text_fallback() {
        assert_eq!(
            detect_content_type(b"SSH-2.0-OpenSSH_9.6\r\n"),
            "text/plain; charset=utf-8"
        );
        assert_eq!(detect_content_type(b""), "text/plain; charset=utf-8");
    }

    #[test]
    fn binary_fallback() {
        assert_eq!(
            detect_content_type(&[0x00, 0x01, 0x02, 0x03]),
            "application/octet-stream"
        );
        // An SSH binary packet after the banner phase.
        assert_eq!(
            detect_content_type(&[0x00, 0x00, 0x01, 0x44, 0x08, 0x14, 0x99]),
            "application/octet-stream"
        );
    }

    #[test]
    fn considers_at_most_512_bytes() {
        let mut data = vec![b'a'; 600];
        data[550] = 0x00; // binary byte beyond the window
        assert_eq!(detect_content_type(&data), "text/plain; charset=utf-8");
    }
}
