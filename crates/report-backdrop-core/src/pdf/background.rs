//! Decoding stored backgrounds into something that can be drawn under a page.
//!
//! A background is either a PDF (its first page is used) or a PNG/JPEG
//! image. Images are wrapped as a single image XObject sized one point per
//! pixel; the compositor's fit mode scales them onto the report page.

use image::{DynamicImage, GenericImageView};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::objects::{copy_object, page_box, page_content, page_resources};
use crate::error::{Error, Result};
use crate::rules::Background;
use crate::util::looks_like_pdf;

const IMAGE_NAME: &str = "Im0";

/// A decoded background page, independent of any target document.
#[derive(Debug, Clone)]
pub struct BackgroundPage {
    /// Objects the resources may reference
    objects: BTreeMap<ObjectId, Object>,
    resources: Dictionary,
    content: Vec<u8>,
    media_box: [f32; 4],
    content_id: String,
}

impl BackgroundPage {
    /// Decode a stored background.
    pub fn decode(background: &Background) -> Result<Self> {
        let bytes = background.bytes();
        if bytes.is_empty() {
            return Err(Error::BackgroundDecode("background is empty".to_string()));
        }

        let content_id = background.content_id();
        if looks_like_pdf(bytes) {
            Self::from_pdf(bytes, content_id)
        } else {
            Self::from_image(bytes, content_id)
        }
    }

    fn from_pdf(bytes: &[u8], content_id: String) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| Error::BackgroundDecode(format!("Failed to parse background PDF: {e}")))?;

        let pages = doc.get_pages();
        let Some((_, &page_id)) = pages.iter().next() else {
            return Err(Error::BackgroundDecode("background PDF has no pages".to_string()));
        };
        if pages.len() > 1 {
            warn!(
                "Background PDF has {} pages, only the first one is used",
                pages.len()
            );
        }

        let media_box = page_box(&doc, page_id);
        let resources = page_resources(&doc, page_id);
        let content = page_content(&doc, page_id)?;

        debug!(
            "Decoded PDF background {} ({}x{} pt)",
            content_id,
            media_box[2] - media_box[0],
            media_box[3] - media_box[1]
        );

        Ok(Self {
            objects: doc.objects,
            resources,
            content,
            media_box,
            content_id,
        })
    }

    fn from_image(bytes: &[u8], content_id: String) -> Result<Self> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            Error::BackgroundDecode(format!("Background is neither a PDF nor a supported image: {e}"))
        })?;
        let (width, height) = image.dimensions();

        let mut objects = BTreeMap::new();
        let image_id = (1, 0);
        let mut image_stream = rgb_stream(&image)?;

        if image.color().has_alpha() {
            let smask_id = (2, 0);
            objects.insert(smask_id, Object::Stream(alpha_stream(&image)?));
            image_stream.dict.set("SMask", Object::Reference(smask_id));
        }
        objects.insert(image_id, Object::Stream(image_stream));

        let resources = dictionary! {
            "XObject" => dictionary! { IMAGE_NAME => image_id },
        };
        let content = format!("q {width} 0 0 {height} 0 0 cm /{IMAGE_NAME} Do Q\n").into_bytes();

        debug!("Decoded image background {} ({}x{} px)", content_id, width, height);

        #[allow(clippy::cast_precision_loss)]
        let media_box = [0.0, 0.0, width as f32, height as f32];

        Ok(Self {
            objects,
            resources,
            content,
            media_box,
            content_id,
        })
    }

    /// Background bounds as `[x0, y0, x1, y1]` in points.
    pub const fn media_box(&self) -> [f32; 4] {
        self.media_box
    }

    /// MD5 hex of the stored background bytes.
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Copy the background into `target` as a Form XObject and return its id.
    pub(crate) fn import_as_form(&self, target: &mut Document) -> Result<ObjectId> {
        let mut map = HashMap::new();
        let resources = copy_object(
            target,
            &self.objects,
            &Object::Dictionary(self.resources.clone()),
            &mut map,
        )?;

        let bbox: Vec<Object> = self.media_box.iter().map(|v| Object::Real(*v)).collect();
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => bbox,
            "Resources" => resources,
        };

        Ok(target.add_object(Stream::new(dict, self.content.clone())))
    }
}

fn rgb_stream(image: &DynamicImage) -> Result<Stream> {
    let (width, height) = image.dimensions();
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    compressed(dict, image.to_rgb8().into_raw())
}

fn alpha_stream(image: &DynamicImage) -> Result<Stream> {
    let (width, height) = image.dimensions();
    let alpha: Vec<u8> = image.to_rgba8().pixels().map(|p| p[3]).collect();
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
    };
    compressed(dict, alpha)
}

fn compressed(dict: Dictionary, content: Vec<u8>) -> Result<Stream> {
    let mut stream = Stream::new(dict, content);
    stream
        .compress()
        .map_err(|e| Error::BackgroundDecode(format!("Failed to compress image: {e}")))?;
    Ok(stream)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::{sample_image, sample_pdf};
    use image::ImageFormat;

    #[test]
    fn test_decode_pdf_uses_first_page() {
        let bytes = sample_pdf(2, [0.0, 0.0, 595.0, 842.0]);
        let page = BackgroundPage::decode(&Background::new(bytes)).unwrap();

        assert_eq!(page.media_box(), [0.0, 0.0, 595.0, 842.0]);
        assert!(String::from_utf8_lossy(&page.content).contains("Page 1"));
        assert!(!String::from_utf8_lossy(&page.content).contains("Page 2"));
        assert!(page.resources.has(b"Font"));
    }

    #[test]
    fn test_decode_png_with_alpha() {
        let bytes = sample_image(40, 20, [255, 0, 0, 128], ImageFormat::Png);
        let page = BackgroundPage::decode(&Background::new(bytes)).unwrap();

        assert_eq!(page.media_box(), [0.0, 0.0, 40.0, 20.0]);
        let image = page.objects[&(1, 0)].as_stream().unwrap();
        assert!(image.dict.has(b"SMask"));
        assert!(image.dict.has(b"Filter"));
        assert_eq!(page.objects.len(), 2);
    }

    #[test]
    fn test_decode_jpeg_without_alpha() {
        let bytes = sample_image(8, 8, [0, 0, 255, 255], ImageFormat::Jpeg);
        let page = BackgroundPage::decode(&Background::new(bytes)).unwrap();

        let image = page.objects[&(1, 0)].as_stream().unwrap();
        assert!(!image.dict.has(b"SMask"));
        assert_eq!(page.objects.len(), 1);
    }

    #[test]
    fn test_decode_garbage_and_empty() {
        assert!(matches!(
            BackgroundPage::decode(&Background::new(b"not an image".to_vec())),
            Err(Error::BackgroundDecode(_))
        ));
        assert!(matches!(
            BackgroundPage::decode(&Background::new(Vec::new())),
            Err(Error::BackgroundDecode(_))
        ));
        assert!(matches!(
            BackgroundPage::decode(&Background::new(b"%PDF-1.4 truncated".to_vec())),
            Err(Error::BackgroundDecode(_))
        ));
    }

    #[test]
    fn test_import_as_form() {
        let bytes = sample_pdf(1, [0.0, 0.0, 200.0, 100.0]);
        let page = BackgroundPage::decode(&Background::new(bytes)).unwrap();

        let mut target = Document::with_version("1.5");
        let form_id = page.import_as_form(&mut target).unwrap();
        let form = target.get_object(form_id).unwrap().as_stream().unwrap();

        assert_eq!(form.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Form");
        let resources = form.dict.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        let font_id = fonts.get(b"F1").unwrap().as_reference().unwrap();
        assert!(target.get_object(font_id).is_ok());
    }
}
