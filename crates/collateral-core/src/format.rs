use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const EMPTY_ZIP_MAGIC: &[u8; 4] = b"PK\x05\x06";

/// Files below this size never count toward completeness.
pub const MIN_ARTIFACT_BYTES: u64 = 1000;

fn read_head(path: &Path) -> io::Result<[u8; 4]> {
    let mut head = [0u8; 4];
    File::open(path)?.read_exact(&mut head)?;
    Ok(head)
}

/// True only if the file starts with `%PDF`. Unreadable or short files are not PDFs.
pub fn is_pdf(path: &Path) -> bool {
    matches!(read_head(path), Ok(head) if &head == PDF_MAGIC)
}

/// Cheap signature check used to decide whether a download must be unpacked.
pub fn looks_like_zip(path: &Path) -> bool {
    let by_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    by_extension
        || matches!(read_head(path), Ok(head) if &head == ZIP_MAGIC || &head == EMPTY_ZIP_MAGIC)
}

/// Archive formats that are copied into a CAD slot as-is rather than wrapped.
pub fn is_archive_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| matches!(ext.as_str(), "zip" | "gz" | "rar"))
        .unwrap_or(false)
}
