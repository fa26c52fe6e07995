pub mod connection;
pub mod entity;
pub mod repository;
pub mod retry;

pub use connection::establish_connection;
pub use retry::with_retry;

/// Page size applied when a list query does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 50;
/// Hard cap on any list query.
pub const MAX_PAGE_SIZE: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_bounded() {
        assert_eq!(Page::default().limit, DEFAULT_PAGE_SIZE);
        assert_eq!(Page::new(Some(10_000), None).limit, MAX_PAGE_SIZE);
        assert_eq!(Page::new(Some(0), Some(7)), Page { limit: 1, offset: 7 });
    }
}
