//! Underlaying backgrounds beneath report pages.
//!
//! Each distinct background is imported once as a Form XObject. Every page
//! that uses it gets a small content stream, prepended to its existing
//! contents, which draws the form through a fit matrix:
//!
//! ```text
//! q a b c d e f cm /Bg0 Do Q
//! ```
//!
//! Because the stream comes first and is wrapped in `q`/`Q`, the report's
//! own content paints over the background with an untouched graphics state.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::background::BackgroundPage;
use super::objects::{page_box, page_resources, resolve};
use super::page_number::PageNumber;
use crate::config::BackgroundFit;
use crate::error::{Error, Result};

const NAME_PREFIX: &str = "Bg";

/// One page and the background drawn beneath it
#[derive(Debug, Clone)]
pub struct PageAssignment {
    pub page: PageNumber,
    pub background: Arc<BackgroundPage>,
}

/// Places backgrounds beneath pages of an existing PDF
#[derive(Debug, Clone, Copy, Default)]
pub struct Composer {
    fit: BackgroundFit,
}

impl Composer {
    pub const fn new(fit: BackgroundFit) -> Self {
        Self { fit }
    }

    /// Apply the assignments and return the new PDF bytes.
    ///
    /// With no assignments the input is returned unchanged.
    pub fn compose(&self, pdf_bytes: &[u8], assignments: &[PageAssignment]) -> Result<Vec<u8>> {
        if assignments.is_empty() {
            return Ok(pdf_bytes.to_vec());
        }

        let mut doc = Document::load_mem(pdf_bytes)
            .map_err(|e| Error::Lopdf(format!("Failed to load PDF: {e}")))?;
        let pages = doc.get_pages();

        // content id -> imported form
        let mut forms: HashMap<&str, ObjectId> = HashMap::new();

        for assignment in assignments {
            let page_id = *pages
                .get(&assignment.page.get())
                .ok_or(Error::PdfInvalidPage {
                    page: assignment.page.get() as usize,
                    total: pages.len(),
                })?;

            let background = &assignment.background;
            let form_id = match forms.get(background.content_id()) {
                Some(id) => *id,
                None => {
                    let id = background.import_as_form(&mut doc)?;
                    forms.insert(background.content_id(), id);
                    id
                }
            };

            self.underlay(&mut doc, page_id, form_id, background.media_box())
                .map_err(|e| Error::PdfCompose {
                    page: assignment.page.get(),
                    reason: e.to_string(),
                })?;
        }

        debug!(
            "Placed {} distinct background(s) under {} page(s)",
            forms.len(),
            assignments.len()
        );

        doc.compress();

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| Error::PdfSave(format!("Failed to save PDF: {e}")))?;

        Ok(output)
    }

    fn underlay(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        form_id: ObjectId,
        background_box: [f32; 4],
    ) -> Result<()> {
        let target_box = page_box(doc, page_id);
        let [a, b, c, d, e, f] = self.fit.matrix(&background_box, &target_box);

        // Resources are materialized per page so shared dictionaries stay intact
        let mut resources = page_resources(doc, page_id);
        let mut xobjects = match resources.get(b"XObject") {
            Ok(obj) => match resolve(&doc.objects, obj) {
                Some(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            },
            Err(_) => Dictionary::new(),
        };

        let name = unused_name(&xobjects);
        xobjects.set(name.clone(), Object::Reference(form_id));
        resources.set("XObject", Object::Dictionary(xobjects));

        let content = format!("q {a} {b} {c} {d} {e} {f} cm /{name} Do Q\n");
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let underlay = Object::Reference(stream_id);

        // An indirect contents array is flattened so every entry stays a stream
        let existing = doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|page| page.get(b"Contents").ok());
        let contents = match existing {
            Some(existing) => match resolve(&doc.objects, existing) {
                Some(Object::Array(streams)) => {
                    let mut streams = streams.clone();
                    streams.insert(0, underlay);
                    Object::Array(streams)
                }
                _ => Object::Array(vec![underlay, existing.clone()]),
            },
            None => underlay,
        };

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| Error::Lopdf(format!("Failed to get page: {e}")))?;

        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", contents);

        Ok(())
    }
}

/// First `BgN` name not already used by the page's XObjects.
fn unused_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("{NAME_PREFIX}{n}"))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| NAME_PREFIX.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::{sample_image, sample_pdf};
    use crate::pdf::objects::page_content;
    use crate::rules::Background;
    use image::ImageFormat;

    const A4: [f32; 4] = [0.0, 0.0, 595.0, 842.0];

    fn background(bytes: Vec<u8>) -> Arc<BackgroundPage> {
        Arc::new(BackgroundPage::decode(&Background::new(bytes)).unwrap())
    }

    fn assign(page: u32, total: usize, bg: &Arc<BackgroundPage>) -> PageAssignment {
        PageAssignment {
            page: PageNumber::new(page, total).unwrap(),
            background: Arc::clone(bg),
        }
    }

    fn first_content(doc: &Document, page_id: ObjectId) -> String {
        let page = doc.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        let stream = doc
            .get_object(contents[0].as_reference().unwrap())
            .unwrap()
            .as_stream()
            .unwrap();
        String::from_utf8(stream.decompressed_content().unwrap_or_else(|_| stream.content.clone()))
            .unwrap()
    }

    #[test]
    fn test_no_assignments_returns_input() {
        let pdf = sample_pdf(2, A4);
        let out = Composer::default().compose(&pdf, &[]).unwrap();
        assert_eq!(out, pdf);
    }

    #[test]
    fn test_background_prepended_on_selected_pages() {
        let pdf = sample_pdf(3, A4);
        let bg = background(sample_pdf(1, A4));

        let out = Composer::new(BackgroundFit::Contain)
            .compose(&pdf, &[assign(1, 3, &bg), assign(3, 3, &bg)])
            .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);

        for page in [1, 3] {
            let content = first_content(&doc, pages[&page]);
            assert!(content.starts_with("q 1 0 0 1 0 0 cm /Bg0 Do Q"), "{content}");
            let dict = doc.get_dictionary(pages[&page]).unwrap();
            let contents = dict.get(b"Contents").unwrap().as_array().unwrap();
            assert_eq!(contents.len(), 2);
        }

        // untouched page keeps its single content reference
        let middle = doc.get_dictionary(pages[&2]).unwrap();
        assert!(middle.get(b"Contents").unwrap().as_reference().is_ok());
    }

    #[test]
    fn test_form_imported_once_per_background() {
        let pdf = sample_pdf(2, A4);
        let bg = background(sample_pdf(1, A4));

        let out = Composer::default()
            .compose(&pdf, &[assign(1, 2, &bg), assign(2, 2, &bg)])
            .unwrap();
        let doc = Document::load_mem(&out).unwrap();

        let form_ids: Vec<ObjectId> = doc
            .get_pages()
            .values()
            .map(|&page_id| {
                let resources = page_resources(&doc, page_id);
                let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
                xobjects.get(b"Bg0").unwrap().as_reference().unwrap()
            })
            .collect();
        assert_eq!(form_ids[0], form_ids[1]);
    }

    #[test]
    fn test_contain_scales_image_to_page() {
        let pdf = sample_pdf(1, [0.0, 0.0, 200.0, 100.0]);
        let bg = background(sample_image(100, 100, [0, 0, 0, 255], ImageFormat::Png));

        let out = Composer::new(BackgroundFit::Contain)
            .compose(&pdf, &[assign(1, 1, &bg)])
            .unwrap();
        let doc = Document::load_mem(&out).unwrap();
        let content = first_content(&doc, doc.get_pages()[&1]);
        assert!(content.starts_with("q 1 0 0 1 50 0 cm /Bg0 Do Q"), "{content}");
    }

    #[test]
    fn test_indirect_contents_array_is_flattened() {
        let mut doc = Document::load_mem(&sample_pdf(1, A4)).unwrap();
        let page_id = doc.get_pages()[&1];
        let original = doc.get_dictionary(page_id).unwrap().get(b"Contents").unwrap().clone();
        let array_id = doc.add_object(Object::Array(vec![original]));
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("Contents", array_id);
        let mut pdf = Vec::new();
        doc.save_to(&mut pdf).unwrap();

        let bg = background(sample_pdf(1, A4));
        let out = Composer::default().compose(&pdf, &[assign(1, 1, &bg)]).unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let page_id = doc.get_pages()[&1];
        let contents = doc.get_dictionary(page_id).unwrap().get(b"Contents").unwrap();
        let contents = resolve(&doc.objects, contents).unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 2);
        for entry in contents {
            assert!(matches!(resolve(&doc.objects, entry), Some(Object::Stream(_))));
        }
        assert!(first_content(&doc, page_id).contains("/Bg0 Do Q"));

        let text = String::from_utf8_lossy(&page_content(&doc, page_id).unwrap()).into_owned();
        assert!(text.contains("Page 1"), "{text}");
    }

    #[test]
    fn test_name_avoids_existing_xobjects() {
        let mut xobjects = Dictionary::new();
        xobjects.set("Bg0", Object::Null);
        xobjects.set("Bg1", Object::Null);
        assert_eq!(unused_name(&xobjects), "Bg2");
        assert_eq!(unused_name(&Dictionary::new()), "Bg0");
    }

    #[test]
    fn test_page_out_of_range() {
        let pdf = sample_pdf(1, A4);
        let bg = background(sample_pdf(1, A4));
        let bad = PageAssignment {
            page: PageNumber::new(2, 2).unwrap(),
            background: bg,
        };
        assert!(matches!(
            Composer::default().compose(&pdf, &[bad]),
            Err(Error::PdfInvalidPage { page: 2, total: 1 })
        ));
    }
}
