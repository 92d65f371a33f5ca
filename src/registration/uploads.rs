use bytes::Bytes;

use crate::error::{AppError, AppResult};

pub const CV_MAX_BYTES: usize = 10 * 1024 * 1024;
pub const PICTURE_MAX_BYTES: usize = 5 * 1024 * 1024;

pub const CV_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];
pub const PICTURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

const PDF_MAGIC: &[u8] = b"%PDF-";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Lower-cased extension, if any.
pub fn extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn checked_extension(upload: &Upload, allowed: &[&str], what: &str) -> AppResult<String> {
    match extension(&upload.filename) {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(ext),
        _ => Err(AppError::InvalidInput(format!(
            "Invalid {} file format. Allowed: {}",
            what,
            allowed.join(", ")
        ))),
    }
}

fn check_size(upload: &Upload, max: usize, what: &str) -> AppResult<()> {
    if upload.body.len() > max {
        return Err(AppError::PayloadTooLarge(format!(
            "{} exceeds the {} MB limit",
            what,
            max / (1024 * 1024)
        )));
    }
    if upload.body.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is empty", what)));
    }
    Ok(())
}

/// Checks a CV upload and returns its normalized extension.
pub fn validate_cv(upload: &Upload) -> AppResult<String> {
    check_size(upload, CV_MAX_BYTES, "CV")?;
    let ext = checked_extension(upload, CV_EXTENSIONS, "CV")?;

    let (expected_ct, magic) = match ext.as_str() {
        "pdf" => ("application/pdf", PDF_MAGIC),
        "doc" => ("application/msword", OLE2_MAGIC),
        _ => (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ZIP_MAGIC,
        ),
    };
    let ct = upload.content_type.split(';').next().unwrap_or("").trim();
    let ct_ok = ct == expected_ct || ct == "application/octet-stream";
    if !ct_ok || !upload.body.starts_with(magic) {
        return Err(AppError::InvalidInput(
            "The uploaded file is not a valid CV document".into(),
        ));
    }
    Ok(ext)
}

/// Checks a profile picture upload and returns its normalized extension.
pub fn validate_picture(upload: &Upload) -> AppResult<String> {
    check_size(upload, PICTURE_MAX_BYTES, "Profile picture")?;
    let ext = checked_extension(upload, PICTURE_EXTENSIONS, "picture")?;
    let b = &upload.body[..];
    let looks_right = match ext.as_str() {
        "jpg" | "jpeg" => b.starts_with(&[0xFF, 0xD8, 0xFF]),
        "png" => b.starts_with(&[0x89, b'P', b'N', b'G']),
        "gif" => b.starts_with(b"GIF8"),
        _ => b.len() >= 12 && &b[..4] == b"RIFF" && &b[8..12] == b"WEBP",
    };
    if !looks_right {
        return Err(AppError::InvalidInput(
            "The uploaded picture does not match its extension".into(),
        ));
    }
    Ok(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, ct: &str, body: &[u8]) -> Upload {
        Upload {
            filename: name.into(),
            content_type: ct.into(),
            body: Bytes::copy_from_slice(body),
        }
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(extension("cv.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension(".pdf"), None);
    }

    #[test]
    fn accepts_real_documents() {
        assert_eq!(
            validate_cv(&upload("cv.pdf", "application/pdf", b"%PDF-1.7 ...")).unwrap(),
            "pdf"
        );
        assert_eq!(
            validate_cv(&upload(
                "cv.docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                b"PK\x03\x04rest"
            ))
            .unwrap(),
            "docx"
        );
        let mut doc = OLE2_MAGIC.to_vec();
        doc.extend_from_slice(b"body");
        assert_eq!(
            validate_cv(&upload("cv.doc", "application/msword", &doc)).unwrap(),
            "doc"
        );
    }

    #[test]
    fn rejects_disguised_or_wrong_types() {
        assert!(matches!(
            validate_cv(&upload("cv.pdf", "application/pdf", b"MZ\x90\x00")),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_cv(&upload("cv.pdf", "image/png", b"%PDF-1.7")),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_cv(&upload("cv.exe", "application/pdf", b"%PDF-1.7")),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn enforces_size_ceilings() {
        let mut big = b"%PDF-".to_vec();
        big.resize(CV_MAX_BYTES + 1, 0);
        assert!(matches!(
            validate_cv(&upload("cv.pdf", "application/pdf", &big)),
            Err(AppError::PayloadTooLarge(_))
        ));

        let mut pic = vec![0xFF, 0xD8, 0xFF];
        pic.resize(PICTURE_MAX_BYTES + 1, 0);
        assert!(matches!(
            validate_picture(&upload("me.jpg", "image/jpeg", &pic)),
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn pictures_checked_against_extension() {
        assert_eq!(
            validate_picture(&upload("me.PNG", "image/png", b"\x89PNG\r\n")).unwrap(),
            "png"
        );
        assert_eq!(
            validate_picture(&upload("me.webp", "image/webp", b"RIFF\0\0\0\0WEBPVP8 ")).unwrap(),
            "webp"
        );
        assert!(validate_picture(&upload("me.bmp", "image/bmp", b"BM")).is_err());
        assert!(validate_picture(&upload("me.gif", "image/gif", b"\x89PNG")).is_err());
    }
}
