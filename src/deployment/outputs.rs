//! Build outputs: static assets, asset aliases and function endpoints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// How an endpoint is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Rendered by the origin on every request.
    Function,
    /// Served from the ISR cache when possible, origin otherwise.
    Isr,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Endpoint {
    #[serde(rename = "type")]
    pub kind: EndpointKind,
}

/// What the build produced, keyed by pathname.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentOutputs {
    pub static_assets: BTreeSet<String>,
    /// Alias pathname → asset pathname (e.g. `/about` → `/about.html`).
    pub static_assets_aliases: BTreeMap<String, String>,
    /// Lower-cased pathname → endpoint.
    pub endpoints: BTreeMap<String, Endpoint>,
}

impl DeploymentOutputs {
    /// Asset pathname serving `pathname`, following aliases.
    pub fn static_asset(&self, pathname: &str) -> Option<&str> {
        if let Some(asset) = self.static_assets.get(pathname) {
            return Some(asset.as_str());
        }
        self.static_assets_aliases
            .get(pathname)
            .filter(|asset| self.static_assets.contains(asset.as_str()))
            .map(String::as_str)
    }

    /// Endpoint for `pathname`, looked up by its lower-cased form.
    pub fn endpoint(&self, pathname: &str) -> Option<&Endpoint> {
        self.endpoints.get(&pathname.to_lowercase())
    }

    /// Every pathname the outputs can serve.
    pub fn pathnames(&self) -> impl Iterator<Item = &str> {
        self.static_assets
            .iter()
            .chain(self.static_assets_aliases.keys())
            .chain(self.endpoints.keys())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> DeploymentOutputs {
        serde_json::from_str(
            r#"{
                "staticAssets": ["/about.html", "/logo.png"],
                "staticAssetsAliases": {"/about": "/about.html", "/dangling": "/nope.html"},
                "endpoints": {"/blog/[slug]": {"type": "isr"}, "/api/hello": {"type": "function"}, "/x": {"type": "edge"}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_alias_resolution() {
        let outputs = outputs();
        assert_eq!(outputs.static_asset("/logo.png"), Some("/logo.png"));
        assert_eq!(outputs.static_asset("/about"), Some("/about.html"));
        assert_eq!(outputs.static_asset("/dangling"), None);
    }

    #[test]
    fn test_endpoint_lookup_is_lowercased() {
        let outputs = outputs();
        assert_eq!(outputs.endpoint("/API/Hello").unwrap().kind, EndpointKind::Function);
        assert_eq!(outputs.endpoint("/blog/[slug]").unwrap().kind, EndpointKind::Isr);
        assert_eq!(outputs.endpoint("/x").unwrap().kind, EndpointKind::Other);
    }

    #[test]
    fn test_pathnames_cover_all_outputs() {
        let outputs = outputs();
        let all: BTreeSet<&str> = outputs.pathnames().collect();
        assert!(all.contains("/about"));
        assert!(all.contains("/about.html"));
        assert!(all.contains("/api/hello"));
        assert_eq!(all.len(), 7);
    }
}
