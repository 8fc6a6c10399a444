mod background;
mod compose;
mod document;
mod objects;
mod page_number;

#[cfg(test)]
pub(crate) mod fixtures;

pub use background::BackgroundPage;
pub use compose::{Composer, PageAssignment};
pub use document::PdfDocument;
pub use page_number::PageNumber;
