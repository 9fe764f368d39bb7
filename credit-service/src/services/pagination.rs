//! Page/page-size clamping shared by every listing operation.

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamped page request. Invalid input is corrected, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    /// `page < 1` becomes 1, `page_size < 1` becomes 20, `page_size > 100` becomes 100.
    pub fn new(page: i64, page_size: i64) -> Self {
        let page = page.max(1);
        let page_size = if page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size.min(MAX_PAGE_SIZE)
        };
        Self { page, page_size }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_invalid_input() {
        assert_eq!(Page::new(0, 0), Page { page: 1, page_size: 20 });
        assert_eq!(Page::new(-3, 500), Page { page: 1, page_size: 100 });
        assert_eq!(Page::new(3, 10).offset(), 20);
    }
}
