//! 이미지 처리 모듈
//!
//! - PDF 내장 이미지 추출 (lopdf, DCTDecode JPEG 스트림)
//! - 이미지 파일 로드 및 base64 인코딩/디코딩
//! - 매직 바이트 기반 포맷 판별

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::{Dictionary, Object};
use sha2::{Digest, Sha256};

use super::{Element, ElementKind};

/// 이보다 작은 이미지(아이콘, 장식)는 건너뜀 (픽셀)
const MIN_IMAGE_SIDE: i64 = 32;

/// PDF에서 추출된 이미지
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// JPEG 바이트
    pub data: Vec<u8>,
    /// 페이지 번호 (알 수 없으면 None)
    pub page: Option<usize>,
}

// ============================================================================
// PDF Image Extraction
// ============================================================================

/// PDF 내장 JPEG 이미지 추출
///
/// `output_dir`에 `<pdf 이름>-<경로 해시>-<번호>.jpg`로 저장하고 추출 결과를 반환합니다.
/// 같은 PDF에서 이전에 추출한 파일은 먼저 지웁니다.
/// JPEG(DCTDecode) 단일 필터가 아닌 이미지는 건너뜁니다.
pub fn extract_pdf_images(pdf_path: &Path, output_dir: &Path) -> Result<Vec<ExtractedImage>> {
    let doc = lopdf::Document::load(pdf_path)
        .map_err(|e| anyhow::anyhow!("Failed to load PDF {:?}: {}", pdf_path, e))?;

    let prefix = figure_prefix(pdf_path);
    remove_figures(output_dir, &prefix)?;

    let mut images = Vec::new();

    for (object_id, object) in doc.objects.iter() {
        let Object::Stream(stream) = object else {
            continue;
        };

        if !is_image(&stream.dict) {
            continue;
        }

        if !is_jpeg(&stream.dict) {
            tracing::debug!("Skipping non-JPEG image object {:?} in {:?}", object_id, pdf_path);
            continue;
        }

        if is_too_small(&stream.dict) {
            tracing::debug!("Skipping small image object {:?}", object_id);
            continue;
        }

        if images.is_empty() && !output_dir.exists() {
            std::fs::create_dir_all(output_dir)
                .with_context(|| format!("Failed to create image directory: {:?}", output_dir))?;
        }

        let path = output_dir.join(format!("{}-{}.jpg", prefix, images.len() + 1));
        std::fs::write(&path, &stream.content)
            .with_context(|| format!("Failed to write image: {:?}", path))?;

        images.push(ExtractedImage {
            data: stream.content.clone(),
            page: None,
        });
    }

    tracing::debug!("Extracted {} images from {:?}", images.len(), pdf_path);
    Ok(images)
}

/// 추출 파일 이름 접두사 (`<pdf 이름>-<경로 SHA-256 앞 8자>`)
///
/// 하위 폴더에 같은 이름의 PDF가 있어도 파일이 겹치지 않습니다.
pub fn figure_prefix(pdf_path: &Path) -> String {
    let stem = pdf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let digest = format!("{:x}", Sha256::digest(pdf_path.to_string_lossy().as_bytes()));
    format!("{}-{}", stem, &digest[..8])
}

/// `<prefix>-<번호>.jpg` 파일 삭제
fn remove_figures(output_dir: &Path, prefix: &str) -> Result<()> {
    if !output_dir.is_dir() {
        return Ok(());
    }

    let pattern = format!("{}-", prefix);
    for entry in std::fs::read_dir(output_dir)
        .with_context(|| format!("Failed to read image directory: {:?}", output_dir))?
    {
        let path = entry?.path();
        let is_stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&pattern))
            .and_then(|rest| rest.strip_suffix(".jpg"))
            .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);

        if is_stale {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale image: {:?}", path))?;
        }
    }
    Ok(())
}

fn name_is(object: &Object, expected: &[u8]) -> bool {
    matches!(object, Object::Name(name) if name.as_slice() == expected)
}

fn is_image(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|o| name_is(o, b"Image"))
        .unwrap_or(false)
}

fn is_jpeg(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Array(filters)) => {
            filters.len() == 1 && name_is(&filters[0], b"DCTDecode")
        }
        Ok(filter) => name_is(filter, b"DCTDecode"),
        Err(_) => false,
    }
}

fn is_too_small(dict: &Dictionary) -> bool {
    let side = |key: &[u8]| match dict.get(key) {
        Ok(Object::Integer(v)) => Some(*v),
        _ => None,
    };

    matches!(
        (side(b"Width"), side(b"Height")),
        (Some(w), Some(h)) if w < MIN_IMAGE_SIDE || h < MIN_IMAGE_SIDE
    )
}

// ============================================================================
// Image Files
// ============================================================================

/// 이미지 파일을 요소로 로드
pub async fn load_image(path: &Path) -> Result<Element> {
    mime_type(path)?;

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {:?}", path))?;

    if data.is_empty() {
        anyhow::bail!("Image file is empty: {:?}", path);
    }

    Ok(Element {
        kind: ElementKind::Image,
        content: encode_image(&data),
        source: path.to_path_buf(),
        page: None,
    })
}

/// 파일 경로에서 MIME 타입 결정
pub fn mime_type(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "webp" => Ok("image/webp"),
        "gif" => Ok("image/gif"),
        "bmp" => Ok("image/bmp"),
        _ => anyhow::bail!("Unsupported image format: {}", ext),
    }
}

// ============================================================================
// Base64
// ============================================================================

/// 바이트를 base64 문자열로
pub fn encode_image(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// base64 문자열을 바이트로
pub fn decode_image(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .context("Invalid base64 image data")
}

/// 매직 바이트로 확장자 판별
pub fn sniff_image_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [0x89, b'P', b'N', b'G', ..] => "png",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        [b'B', b'M', ..] => "bmp",
        _ => "bin",
    }
}

/// base64 이미지의 MIME 타입 (알 수 없으면 image/jpeg)
pub fn sniff_mime_from_base64(data: &str) -> &'static str {
    // 앞 16자 = 12바이트면 판별에 충분
    let prefix: String = data.trim().chars().take(16).collect();
    let bytes = STANDARD.decode(prefix).unwrap_or_default();

    match sniff_image_extension(&bytes) {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Stream};
    use tempfile::TempDir;

    /// 본문 한 줄과 64x64 JPEG 한 장이 든 1페이지 PDF 생성
    pub(crate) fn write_sample_pdf(path: &Path, text: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 64,
                "Height" => 64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            JPEG_HEADER.to_vec(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    const PNG_HEADER: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_HEADER: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1];

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("test.png")).unwrap(), "image/png");
        assert_eq!(mime_type(Path::new("test.jpg")).unwrap(), "image/jpeg");
        assert_eq!(mime_type(Path::new("test.JPEG")).unwrap(), "image/jpeg");
        assert!(mime_type(Path::new("test.exe")).is_err());
    }

    #[test]
    fn test_sniff_extension() {
        assert_eq!(sniff_image_extension(&JPEG_HEADER), "jpg");
        assert_eq!(sniff_image_extension(&PNG_HEADER), "png");
        assert_eq!(sniff_image_extension(b"GIF89a"), "gif");
        assert_eq!(sniff_image_extension(b"RIFF\0\0\0\0WEBPVP8 "), "webp");
        assert_eq!(sniff_image_extension(b"nope"), "bin");
    }

    #[test]
    fn test_sniff_mime_from_base64() {
        assert_eq!(sniff_mime_from_base64(&encode_image(&PNG_HEADER)), "image/png");
        assert_eq!(sniff_mime_from_base64(&encode_image(&JPEG_HEADER)), "image/jpeg");
        assert_eq!(sniff_mime_from_base64("not base64!"), "image/jpeg");
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(decode_image("%%%").is_err());
        assert_eq!(decode_image(&encode_image(b"abc")).unwrap(), b"abc");
    }

    #[test]
    fn test_jpeg_filter_detection() {
        let mut dict = Dictionary::new();
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        assert!(is_image(&dict));
        assert!(is_jpeg(&dict));

        dict.set(
            "Filter",
            Object::Array(vec![
                Object::Name(b"FlateDecode".to_vec()),
                Object::Name(b"DCTDecode".to_vec()),
            ]),
        );
        assert!(!is_jpeg(&dict));
    }

    #[test]
    fn test_small_image_detection() {
        let mut dict = Dictionary::new();
        dict.set("Width", Object::Integer(16));
        dict.set("Height", Object::Integer(400));
        assert!(is_too_small(&dict));

        dict.set("Width", Object::Integer(640));
        assert!(!is_too_small(&dict));
    }

    #[tokio::test]
    async fn test_load_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, PNG_HEADER).unwrap();

        let element = load_image(&path).await.unwrap();
        assert_eq!(element.kind, ElementKind::Image);
        assert_eq!(decode_image(&element.content).unwrap(), PNG_HEADER.to_vec());
        assert!(element.page.is_none());
    }

    #[test]
    fn test_extract_pdf_images_writes_figures() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("manual.pdf");
        write_sample_pdf(&pdf, "Sample page.");
        let figures = dir.path().join("figures");

        let images = extract_pdf_images(&pdf, &figures).unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data, JPEG_HEADER.to_vec());
        assert!(images[0].page.is_none());

        let written = figures.join(format!("{}-1.jpg", figure_prefix(&pdf)));
        assert_eq!(std::fs::read(&written).unwrap(), JPEG_HEADER.to_vec());
    }

    #[test]
    fn test_same_stem_in_different_folders() {
        let dir = TempDir::new().unwrap();
        let figures = dir.path().join("figures");
        let first = dir.path().join("a").join("manual.pdf");
        let second = dir.path().join("b").join("manual.pdf");
        for pdf in [&first, &second] {
            std::fs::create_dir_all(pdf.parent().unwrap()).unwrap();
            write_sample_pdf(pdf, "Sample page.");
            extract_pdf_images(pdf, &figures).unwrap();
        }

        assert_ne!(figure_prefix(&first), figure_prefix(&second));
        assert_eq!(std::fs::read_dir(&figures).unwrap().count(), 2);
    }

    #[test]
    fn test_reextract_removes_stale_figures() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("manual.pdf");
        write_sample_pdf(&pdf, "Sample page.");
        let figures = dir.path().join("figures");
        std::fs::create_dir_all(&figures).unwrap();

        let prefix = figure_prefix(&pdf);
        let stale = figures.join(format!("{}-7.jpg", prefix));
        let unrelated = figures.join("other-1.jpg");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::write(&unrelated, b"keep").unwrap();

        extract_pdf_images(&pdf, &figures).unwrap();

        assert!(!stale.exists());
        assert!(unrelated.exists());
        assert!(figures.join(format!("{}-1.jpg", prefix)).exists());
    }
}
