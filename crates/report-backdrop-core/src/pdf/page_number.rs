//! 1-based page number newtype.
//!
//! Report rules, lopdf's page map and the user all count pages from 1.
//! Vectors count from 0. This type keeps the two from being mixed up.

use std::fmt;

use crate::error::Error;

/// A validated, 1-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageNumber(u32);

impl PageNumber {
    /// First page of any document.
    pub const FIRST: Self = Self(1);

    /// Create a page number checked against the document's page count.
    pub fn new(page: u32, total_pages: usize) -> Result<Self, Error> {
        let in_range = page >= 1 && usize::try_from(page).is_ok_and(|p| p <= total_pages);
        if !in_range {
            return Err(Error::PdfInvalidPage {
                page: page as usize,
                total: total_pages,
            });
        }
        Ok(Self(page))
    }

    /// Convert a 0-based index, as produced by iterating over pages.
    pub fn from_index(index: usize, total_pages: usize) -> Result<Self, Error> {
        let invalid = || Error::PdfInvalidPage {
            page: index.saturating_add(1),
            total: total_pages,
        };
        if index >= total_pages {
            return Err(invalid());
        }
        let page = u32::try_from(index + 1).map_err(|_| invalid())?;
        Ok(Self(page))
    }

    /// The page number as lopdf's page map keys it.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// 0-based index for Rust collections.
    #[must_use]
    pub const fn as_index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl From<PageNumber> for u32 {
    fn from(page: PageNumber) -> Self {
        page.0
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_in_range() {
        let page = PageNumber::new(3, 5).unwrap();
        assert_eq!(page.get(), 3);
        assert_eq!(page.as_index(), 2);
    }

    #[test]
    fn test_new_out_of_range() {
        assert!(PageNumber::new(0, 5).is_err());
        assert!(matches!(
            PageNumber::new(6, 5),
            Err(Error::PdfInvalidPage { page: 6, total: 5 })
        ));
    }

    #[test]
    fn test_from_index() {
        assert_eq!(PageNumber::from_index(0, 1).unwrap(), PageNumber::FIRST);
        assert!(matches!(
            PageNumber::from_index(2, 2),
            Err(Error::PdfInvalidPage { page: 3, total: 2 })
        ));
    }

    #[test]
    fn test_display_and_into() {
        let page = PageNumber::new(7, 10).unwrap();
        assert_eq!(format!("{page}"), "7");
        let raw: u32 = page.into();
        assert_eq!(raw, 7);
    }
}
