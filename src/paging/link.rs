use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<([^>]*)>;\s*rel="([^"]*)"[,\s]*"#).expect("link pattern is valid")
});

/// Navigation links from an RFC 5988 style `Link` header.
///
/// Relations other than `first`, `prev`, `next` and `last` are ignored.
/// Relation names match case-insensitively; the first occurrence wins.
///
/// # Examples
///
/// ```
/// use restract::paging::LinkSet;
///
/// let links = LinkSet::parse(r#"</items?page=2>; rel="next", </items?page=5>; rel="last""#);
/// assert_eq!(links.next.as_deref(), Some("/items?page=2"));
/// assert!(links.prev.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    pub first: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

impl LinkSet {
    pub fn parse(header: &str) -> Self {
        let mut links = LinkSet::default();
        for captures in LINK.captures_iter(header) {
            let target = captures[1].to_string();
            let slot = match captures[2].to_ascii_lowercase().as_str() {
                "first" => &mut links.first,
                "prev" | "previous" => &mut links.prev,
                "next" => &mut links.next,
                "last" => &mut links.last,
                _ => continue,
            };
            slot.get_or_insert(target);
        }
        links
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.prev.is_none() && self.next.is_none() && self.last.is_none()
    }
}

impl fmt::Display for LinkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = [
            ("first", &self.first),
            ("prev", &self.prev),
            ("next", &self.next),
            ("last", &self.last),
        ];
        let mut separator = "";
        for (rel, target) in entries {
            if let Some(target) = target {
                write!(f, "{}<{}>; rel=\"{}\"", separator, target, rel)?;
                separator = ", ";
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_relations() {
        let header = concat!(
            r#"<http://api.test/items?page=1&pageSize=10>; rel="first", "#,
            r#"<http://api.test/items?page=2&pageSize=10>; rel="prev","#,
            r#"<http://api.test/items?page=4&pageSize=10>;rel="next", "#,
            r#"<http://api.test/items?page=9&pageSize=10>; REL="LAST""#
        );
        let links = LinkSet::parse(header);
        assert_eq!(links.first.as_deref(), Some("http://api.test/items?page=1&pageSize=10"));
        assert_eq!(links.prev.as_deref(), Some("http://api.test/items?page=2&pageSize=10"));
        assert_eq!(links.next.as_deref(), Some("http://api.test/items?page=4&pageSize=10"));
        assert_eq!(links.last.as_deref(), Some("http://api.test/items?page=9&pageSize=10"));
    }

    #[test]
    fn unknown_relations_and_garbage_are_ignored() {
        let links = LinkSet::parse(r#"<http://x/docs>; rel="help", not a link"#);
        assert!(links.is_empty());
    }

    #[test]
    fn displays_in_header_form() {
        let links = LinkSet {
            first: Some("/a?page=1".into()),
            next: Some("/a?page=2".into()),
            ..LinkSet::default()
        };
        let rendered = links.to_string();
        assert_eq!(rendered, r#"</a?page=1>; rel="first", </a?page=2>; rel="next""#);
        assert_eq!(LinkSet::parse(&rendered), links);
    }
}
