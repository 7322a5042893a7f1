//! Data URL normalization.
//!
//! Client-side data fetches use `{basePath}/_next/data/{buildId}/{page}.json`.
//! Rules are written against page pathnames, so data requests are normalized
//! to the page form on entry and denormalized again before probing the known
//! pathname set.

/// Bidirectional mapping between page pathnames and data pathnames for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrls {
    base_path: String,
    prefix: String,
}

const DATA_SUFFIX: &str = ".json";

impl DataUrls {
    pub fn new(base_path: &str, build_id: &str) -> Self {
        let base_path = base_path.trim_end_matches('/').to_string();
        let prefix = format!("{base_path}/_next/data/{build_id}/");
        Self { base_path, prefix }
    }

    /// True if `pathname` is in data form for this build.
    pub fn is_data_url(&self, pathname: &str) -> bool {
        pathname.len() > self.prefix.len() + DATA_SUFFIX.len()
            && pathname.starts_with(&self.prefix)
            && pathname.ends_with(DATA_SUFFIX)
    }

    /// `{basePath}/_next/data/{buildId}/{rest}.json` → `{basePath}/{rest}`.
    /// Anything else is returned unchanged.
    pub fn normalize(&self, pathname: &str) -> String {
        if !self.is_data_url(pathname) {
            return pathname.to_string();
        }

        let rest = &pathname[self.prefix.len()..pathname.len() - DATA_SUFFIX.len()];
        if rest == "index" {
            if self.base_path.is_empty() {
                return "/".to_string();
            }
            return self.base_path.clone();
        }
        format!("{}/{}", self.base_path, rest)
    }

    /// Inverse of [`normalize`](Self::normalize). Paths already in data form,
    /// or outside the base path, are returned unchanged.
    pub fn denormalize(&self, pathname: &str) -> String {
        if self.is_data_url(pathname) {
            return pathname.to_string();
        }

        let Some(page) = pathname.strip_prefix(self.base_path.as_str()) else {
            return pathname.to_string();
        };
        if !page.is_empty() && !page.starts_with('/') {
            // `/docsx` is not under base path `/docs`
            return pathname.to_string();
        }

        let page = page.trim_matches('/');
        let page = if page.is_empty() { "index" } else { page };
        format!("{}{}{}", self.prefix, page, DATA_SUFFIX)
    }
}
