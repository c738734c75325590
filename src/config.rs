//! Configuration shared by navigable results.

/// Query keys and headers used to navigate paged and sorted results.
///
/// # Examples
///
/// ```
/// use restract::PagingConfig;
///
/// let config = PagingConfig::default().with_page_size_key("per_page");
/// assert_eq!(config.page_key, "page");
/// assert_eq!(config.page_size_key, "per_page");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingConfig {
    /// Query key carrying the 1-based page number.
    pub page_key: String,

    /// Query key carrying the page size.
    pub page_size_key: String,

    /// Query key carrying the sort expression (`prop` or `prop:desc`, comma separated).
    pub sort_key: String,

    /// Response header carrying the total item count.
    pub total_count_header: String,

    /// Response header carrying navigation links.
    pub link_header: String,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_key: "page".to_string(),
            page_size_key: "pageSize".to_string(),
            sort_key: "sort".to_string(),
            total_count_header: "X-Total-Count".to_string(),
            link_header: "link".to_string(),
        }
    }
}

impl PagingConfig {
    pub fn with_page_key(mut self, key: impl Into<String>) -> Self {
        self.page_key = key.into();
        self
    }

    pub fn with_page_size_key(mut self, key: impl Into<String>) -> Self {
        self.page_size_key = key.into();
        self
    }

    pub fn with_sort_key(mut self, key: impl Into<String>) -> Self {
        self.sort_key = key.into();
        self
    }

    pub fn with_total_count_header(mut self, header: impl Into<String>) -> Self {
        self.total_count_header = header.into();
        self
    }

    pub fn with_link_header(mut self, header: impl Into<String>) -> Self {
        self.link_header = header.into();
        self
    }
}
