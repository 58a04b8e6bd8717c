//! Upload checks for note attachments.
//!
//! Attachments are clinical documents, scans and photos. Executables are
//! refused by extension and by magic bytes; everything else is stored with a
//! content type detected from its bytes where possible.

use crate::error::{Error, Result};

/// Magic byte signatures for executable files
const EXECUTABLE_SIGNATURES: &[(&str, &[u8])] = &[
    ("Windows PE", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("Mach-O Fat / Java class", &[0xCA, 0xFE, 0xBA, 0xBE]),
];

/// Extensions refused regardless of content (case-insensitive)
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "scr", "pif", "com", "msi", "bat", "cmd", "so", "dylib", "jar", "class", "apk",
    "dmg", "pkg", "lnk", "hta", "reg",
];

/// Longest filename kept after sanitizing.
pub const MAX_FILENAME_LEN: usize = 255;

/// Refuse oversized, empty, or executable uploads.
pub fn check_upload(filename: &str, data: &[u8], max_size_bytes: u64) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidArgument("Uploaded file is empty".to_string()));
    }
    if data.len() as u64 > max_size_bytes {
        return Err(Error::InvalidArgument(format!(
            "File exceeds maximum size of {} bytes",
            max_size_bytes
        )));
    }

    if let Some((_, ext)) = filename.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if BLOCKED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "File extension .{} is not allowed",
                ext
            )));
        }
    }

    for (name, magic) in EXECUTABLE_SIGNATURES {
        if data.starts_with(magic) {
            return Err(Error::InvalidArgument(format!(
                "Executable file detected: {}",
                name
            )));
        }
    }

    Ok(())
}

/// Pick the content type to store for an upload.
///
/// Magic bytes win; then text formats known by extension; then the type the
/// client claimed, if it is well formed; then `application/octet-stream`.
pub fn detect_content_type(filename: &str, data: &[u8], claimed: Option<&str>) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some(mime) = filename
        .rsplit_once('.')
        .and_then(|(_, ext)| text_mime_from_extension(ext))
    {
        return mime.to_string();
    }

    match claimed.map(str::trim) {
        Some(c) if is_valid_mime_type(c) && !claims_binary_media(c) => c.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// Binary media always carries magic bytes; a claim `infer` could not confirm
/// is not trusted.
fn claims_binary_media(claimed: &str) -> bool {
    claimed.starts_with("image/")
        || claimed.starts_with("audio/")
        || claimed.starts_with("video/")
        || claimed == "application/pdf"
        || claimed == "application/zip"
}

/// Text formats that have no magic bytes.
fn text_mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        "xml" => Some("application/xml"),
        "html" | "htm" => Some("text/html"),
        "rtf" => Some("application/rtf"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// RFC 2045 `type/subtype` shape check.
pub fn is_valid_mime_type(mime: &str) -> bool {
    let Some((media_type, subtype)) = mime.split_once('/') else {
        return false;
    };
    let is_token_char = |c: char| -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '!' | '#' | '$' | '&' | '-' | '^' | '_' | '.' | '+')
    };
    !media_type.is_empty()
        && !subtype.is_empty()
        && media_type.chars().all(is_token_char)
        && subtype.chars().all(is_token_char)
}

/// Strip path components and unsafe characters from a client filename.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.');
    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    if sanitized.len() <= MAX_FILENAME_LEN {
        return sanitized.to_string();
    }

    // Keep the extension when truncating; cut on a char boundary.
    let (stem, ext) = match sanitized.rfind('.') {
        Some(dot) if sanitized.len() - dot <= 16 => (&sanitized[..dot], &sanitized[dot..]),
        _ => (sanitized, ""),
    };
    let mut cut = MAX_FILENAME_LEN - ext.len();
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}
