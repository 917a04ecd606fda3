//! Turning a (source, page, index) selector into image bytes.

use crate::error::{Result, VisionError};
use crate::request::ResolvedSource;
use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use mupdf::{Colorspace, Matrix};
use std::io::Cursor;
use tracing::debug;

/// Encoded image ready to be sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, mime: &'static str) -> Self {
        Self { bytes, mime }
    }
}

/// Produces image bytes for a page (`index: None`) or an embedded image.
/// All failures are `SourceResolution`.
#[async_trait]
pub trait SourceMaterializer: Send + Sync {
    async fn materialize(
        &self,
        source: &ResolvedSource,
        page: u32,
        index: Option<u32>,
    ) -> Result<ImageData>;
}

pub const DEFAULT_RENDER_SCALE: f32 = 2.0;

/// PDF materializer. Whole pages are rasterized with MuPDF; embedded images
/// are read straight from their XObject streams with `lopdf`.
///
/// Parsing, rendering and encoding run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PdfMaterializer {
    scale: f32,
}

impl Default for PdfMaterializer {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_SCALE)
    }
}

impl PdfMaterializer {
    /// `scale` is pixels per PDF point, clamped to 0.1..=4.0.
    pub fn new(scale: f32) -> Self {
        Self {
            scale: scale.clamp(0.1, 4.0),
        }
    }
}

#[async_trait]
impl SourceMaterializer for PdfMaterializer {
    async fn materialize(
        &self,
        source: &ResolvedSource,
        page: u32,
        index: Option<u32>,
    ) -> Result<ImageData> {
        let data = match source {
            ResolvedSource::Path(path) => tokio::fs::read(path).await.map_err(|e| {
                VisionError::source_resolution(format!("cannot read {}: {}", path.display(), e))
            })?,
            ResolvedSource::Inline(data) => data.clone(),
        };

        debug!(
            "PdfMaterializer: {} page {} ({})",
            source.describe(),
            page,
            index
                .map(|i| format!("image {}", i))
                .unwrap_or_else(|| "whole page".to_string())
        );

        let scale = self.scale;
        tokio::task::spawn_blocking(move || match index {
            Some(i) => extract_image(&data, page, i),
            None => render_page(&data, page, scale),
        })
        .await
        .map_err(|e| VisionError::source_resolution(format!("materialization task failed: {}", e)))?
    }
}

fn out_of_range(page: u32, count: usize) -> VisionError {
    VisionError::source_resolution(format!(
        "page {} out of range (document has {} pages)",
        page, count
    ))
}

/// Rasterize one page to PNG.
fn render_page(data: &[u8], page: u32, scale: f32) -> Result<ImageData> {
    let mupdf_err = |what: &str, e: mupdf::Error| {
        VisionError::source_resolution(format!("{}: {}", what, e))
    };

    let doc = mupdf::Document::from_bytes(data, "application/pdf")
        .map_err(|e| mupdf_err("failed to load PDF", e))?;
    let count = doc
        .page_count()
        .map_err(|e| mupdf_err("failed to count pages", e))?;
    let page_index = i32::try_from(page)
        .ok()
        .filter(|p| *p <= count)
        .ok_or_else(|| out_of_range(page, count.max(0) as usize))?
        - 1;

    let pdf_page = doc
        .load_page(page_index)
        .map_err(|e| mupdf_err("failed to load page", e))?;
    let matrix = Matrix::new_scale(scale, scale);
    let pixmap = pdf_page
        .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
        .map_err(|e| mupdf_err("failed to render page", e))?;

    encode_pixmap(&pixmap)
}

fn encode_pixmap(pixmap: &mupdf::Pixmap) -> Result<ImageData> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            for c in 0..3 {
                rgb.push(samples.get(offset + c).copied().unwrap_or(0));
            }
        }
    }

    let image = image::RgbImage::from_raw(width, height, rgb)
        .map(image::DynamicImage::ImageRgb8)
        .ok_or_else(|| VisionError::source_resolution("rendered page has no pixels"))?;
    to_png(&image)
}

/// The `index`-th image XObject of `page`.
fn extract_image(data: &[u8], page: u32, index: u32) -> Result<ImageData> {
    let doc = Document::load_mem(data)
        .map_err(|e| VisionError::source_resolution(format!("failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    let page_id = *pages.get(&page).ok_or_else(|| out_of_range(page, pages.len()))?;

    let images = page_images(&doc, page_id);
    let stream = *images.get(index as usize).ok_or_else(|| {
        VisionError::source_resolution(format!(
            "page {} has no image at index {} ({} images found)",
            page,
            index,
            images.len()
        ))
    })?;

    encode_image(stream)
}

/// Image XObjects of a page, in resource dictionary order.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<&Stream> {
    let Some(resources) = page_resources(doc, page_id) else {
        return Vec::new();
    };
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| {
            let stream = match obj {
                Object::Reference(id) => doc.get_object(*id).ok()?.as_stream().ok()?,
                Object::Stream(s) => s,
                _ => return None,
            };
            let subtype = stream.dict.get(b"Subtype").ok()?.as_name().ok()?;
            (subtype == b"Image").then_some(stream)
        })
        .collect()
}

/// The page's Resources, following inherited values up the page tree.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // bounded walk; malformed trees may contain Parent cycles
    for _ in 0..32 {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()?
        .as_i64()
        .ok()
        .and_then(|v| u32::try_from(v).ok())
}

fn filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn encode_image(stream: &Stream) -> Result<ImageData> {
    let filters = filters(&stream.dict);
    match filters.iter().map(Vec::as_slice).collect::<Vec<_>>().as_slice() {
        [b"DCTDecode"] => return Ok(ImageData::new(stream.content.clone(), "image/jpeg")),
        [b"JPXDecode"] => return Ok(ImageData::new(stream.content.clone(), "image/jp2")),
        _ => {}
    }

    let pixels = match filters.as_slice() {
        [] => stream.content.clone(),
        [f] if f.as_slice() == b"FlateDecode" => stream.decompressed_content().map_err(|e| {
            VisionError::source_resolution(format!("failed to decompress image: {}", e))
        })?,
        other => {
            let names: Vec<String> = other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            return Err(VisionError::source_resolution(format!(
                "unsupported image encoding: {}",
                names.join(", ")
            )));
        }
    };

    let width = dimension(&stream.dict, b"Width");
    let height = dimension(&stream.dict, b"Height");
    let bits = dimension(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| o.as_name().ok())
        .unwrap_or(b"DeviceRGB".as_slice());

    let (Some(width), Some(height)) = (width, height) else {
        return Err(VisionError::source_resolution("image is missing Width/Height"));
    };
    if bits != 8 {
        return Err(VisionError::source_resolution(format!(
            "unsupported bits per component: {}",
            bits
        )));
    }

    let image = match color_space {
        b"DeviceRGB" => image::RgbImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageRgb8),
        b"DeviceGray" => image::GrayImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageLuma8),
        other => {
            return Err(VisionError::source_resolution(format!(
                "unsupported color space: {}",
                String::from_utf8_lossy(other)
            )))
        }
    }
    .ok_or_else(|| VisionError::source_resolution("image data shorter than Width x Height"))?;

    to_png(&image)
}

fn to_png(image: &image::DynamicImage) -> Result<ImageData> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(|e| VisionError::source_resolution(format!("failed to encode PNG: {}", e)))?;
    Ok(ImageData::new(png, "image/png"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;

    pub(crate) enum Fixture {
        Rgb { width: u32, height: u32 },
        Jpeg(Vec<u8>),
    }

    /// Builds a PDF whose pages carry the given images as XObject resources.
    pub(crate) fn build_pdf(pages: Vec<Vec<Fixture>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for images in &pages {
            let mut xobjects = Dictionary::new();
            for (i, fixture) in images.iter().enumerate() {
                let stream = match fixture {
                    Fixture::Rgb { width, height } => Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => *width as i64,
                            "Height" => *height as i64,
                            "ColorSpace" => "DeviceRGB",
                            "BitsPerComponent" => 8i64,
                        },
                        vec![200u8; (*width * *height * 3) as usize],
                    ),
                    Fixture::Jpeg(bytes) => Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => 1i64,
                            "Height" => 1i64,
                            "ColorSpace" => "DeviceRGB",
                            "BitsPerComponent" => 8i64,
                            "Filter" => "DCTDecode",
                        },
                        bytes.clone(),
                    ),
                };
                let image_id = doc.add_object(stream);
                xobjects.set(format!("Im{}", i), image_id);
            }
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0i64.into(), 0i64.into(), 612i64.into(), 792i64.into()],
                "Resources" => dictionary! { "XObject" => xobjects },
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];

    fn sample() -> ResolvedSource {
        ResolvedSource::Inline(build_pdf(vec![
            vec![
                Fixture::Rgb { width: 2, height: 2 },
                Fixture::Rgb { width: 4, height: 3 },
            ],
            vec![Fixture::Jpeg(JPEG.to_vec())],
            vec![],
        ]))
    }

    fn dimensions(image: &ImageData) -> (u32, u32) {
        let decoded = image::load_from_memory(&image.bytes).unwrap();
        (decoded.width(), decoded.height())
    }

    #[tokio::test]
    async fn test_extracts_indexed_image_as_png() {
        let image = PdfMaterializer::default()
            .materialize(&sample(), 1, Some(1))
            .await
            .unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(dimensions(&image), (4, 3));
    }

    #[tokio::test]
    async fn test_jpeg_passes_through() {
        let image = PdfMaterializer::default()
            .materialize(&sample(), 2, Some(0))
            .await
            .unwrap();
        assert_eq!(image, ImageData::new(JPEG.to_vec(), "image/jpeg"));
    }

    #[tokio::test]
    async fn test_whole_page_is_rendered_not_an_embedded_image() {
        let source = ResolvedSource::Inline(build_pdf(vec![
            vec![Fixture::Rgb { width: 1, height: 1 }],
            vec![],
        ]));
        let materializer = PdfMaterializer::new(1.0);

        // a page with only a tiny image still yields the full 612x792pt page
        let page = materializer.materialize(&source, 1, None).await.unwrap();
        assert_eq!(page.mime, "image/png");
        assert_eq!(dimensions(&page), (612, 792));

        // pages without any image render too
        let blank = materializer.materialize(&source, 2, None).await.unwrap();
        assert_eq!(dimensions(&blank), (612, 792));
    }

    #[tokio::test]
    async fn test_render_scale_applies() {
        let source = ResolvedSource::Inline(build_pdf(vec![vec![]]));
        let page = PdfMaterializer::default()
            .materialize(&source, 1, None)
            .await
            .unwrap();
        assert_eq!(dimensions(&page), (1224, 1584));
    }

    #[tokio::test]
    async fn test_selector_errors() {
        let source = sample();
        let cases = [
            (9, None, "page 9 out of range"),
            (9, Some(0), "page 9 out of range"),
            (1, Some(5), "no image at index 5"),
            (3, Some(0), "no image at index 0"),
        ];
        for (page, index, expected) in cases {
            let err = PdfMaterializer::default()
                .materialize(&source, page, index)
                .await
                .unwrap_err();
            assert!(matches!(err, VisionError::SourceResolution(_)));
            assert!(err.to_string().contains(expected), "{}", err);
        }
    }

    #[tokio::test]
    async fn test_reads_path_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, build_pdf(vec![vec![Fixture::Jpeg(JPEG.to_vec())]])).unwrap();

        let image = PdfMaterializer::default()
            .materialize(&ResolvedSource::Path(path), 1, Some(0))
            .await
            .unwrap();
        assert_eq!(image.mime, "image/jpeg");

        let missing = ResolvedSource::Path(dir.path().join("missing.pdf"));
        let err = PdfMaterializer::default()
            .materialize(&missing, 1, None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to resolve PDF source: cannot read"));
    }

    #[tokio::test]
    async fn test_rejects_non_pdf_bytes() {
        let source = ResolvedSource::Inline(b"hello".to_vec());

        let err = PdfMaterializer::default()
            .materialize(&source, 1, Some(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to load PDF"), "{}", err);

        let err = PdfMaterializer::default()
            .materialize(&source, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::SourceResolution(_)), "{:?}", err);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_rendering_does_not_block_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let source = ResolvedSource::Inline(build_pdf(vec![vec![]]));
        let order = AtomicUsize::new(0);
        let materializer = PdfMaterializer::new(4.0);

        let render = async {
            materializer.materialize(&source, 1, None).await.unwrap();
            order.fetch_add(1, Ordering::SeqCst)
        };
        let tick = async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            order.fetch_add(1, Ordering::SeqCst)
        };
        let (render_pos, tick_pos) = tokio::join!(render, tick);

        // the timer fired while the page was still rendering off-thread
        assert_eq!(tick_pos, 0);
        assert_eq!(render_pos, 1);
    }
}
