use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Raw `page` / `limit` query parameters.
///
/// Kept as strings so that garbage falls back to the defaults instead of
/// rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// A resolved, bounded page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: i64, limit: i64) -> Self {
        let page = if page < 1 { DEFAULT_PAGE } else { page };
        let limit = if limit < 1 { DEFAULT_LIMIT } else { limit.min(MAX_LIMIT) };
        Self { page, limit }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl From<&PageQuery> for Page {
    fn from(query: &PageQuery) -> Self {
        let parse = |raw: &Option<String>| raw.as_deref().and_then(|v| v.trim().parse::<i64>().ok());
        Page::new(
            parse(&query.page).unwrap_or(DEFAULT_PAGE),
            parse(&query.limit).unwrap_or(DEFAULT_LIMIT),
        )
    }
}

/// Pagination block returned next to every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: Page, total: i64) -> Self {
        let total = total.max(0);
        Self {
            page: page.page,
            limit: page.limit,
            total,
            pages: (total + page.limit - 1) / page.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn defaults_apply_to_missing_and_garbage() {
        assert_eq!(Page::from(&query(None, None)), Page { page: 1, limit: 10 });
        assert_eq!(Page::from(&query(Some("abc"), Some(""))), Page { page: 1, limit: 10 });
    }

    #[test]
    fn bounds_are_enforced() {
        assert_eq!(Page::from(&query(Some("0"), Some("-5"))), Page { page: 1, limit: 10 });
        assert_eq!(Page::from(&query(Some("3"), Some("1000"))), Page { page: 3, limit: MAX_LIMIT });
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(Page::new(1, 10).offset(), 0);
        assert_eq!(Page::new(4, 25).offset(), 75);
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(Pagination::new(Page::new(1, 10), 0).pages, 0);
        assert_eq!(Pagination::new(Page::new(1, 10), 10).pages, 1);
        assert_eq!(Pagination::new(Page::new(1, 10), 11).pages, 2);
        assert_eq!(Pagination::new(Page::new(2, 3), 7).pages, 3);
    }
}
