//! Keyword filter parsing and evaluation for library search.
//!
//! Search keywords are a `;`-separated list of filter tokens. Every token
//! must match for a manga to be included (the filters are ANDed together).
//!
//! # Token Grammar
//!
//! - `word` - keyless substring match over title, authors, and all tag values
//! - `key:value` - substring match over the values of the `key` tag
//! - a leading `-` inverts the filter (`-horror`, `-tag:horror`)
//! - a trailing `$` switches from substring to exact comparison
//!
//! All comparisons are case-insensitive. Blank tokens are dropped, so a
//! trailing `;` is harmless.
//!
//! # Examples
//!
//! ```rust
//! use hondana::filter::{parse_query, Filter, SearchEntry};
//!
//! let filters = parse_query("one; author:oda; -tag:horror");
//! assert_eq!(filters.len(), 3);
//!
//! let entry = SearchEntry {
//!     title: "One Piece".to_string(),
//!     authors: vec!["Eiichiro Oda".to_string()],
//!     tags: Default::default(),
//! };
//! assert!(Filter::matches_all(&filters, &entry));
//! ```

use std::collections::BTreeMap;

/// Searchable view of one manga, extracted from its metadata.
///
/// The store builds one entry per manga when evaluating a query; filters only
/// ever see this flattened form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchEntry {
    /// Display title, falling back to the manga id when metadata is missing.
    pub title: String,
    /// Author names from metadata.
    pub authors: Vec<String>,
    /// Tag map from metadata: tag name to the list of values.
    pub tags: BTreeMap<String, Vec<String>>,
}

impl SearchEntry {
    /// Values of the tags whose name matches `key` (already lowercased).
    fn tag_values(&self, key: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(name, _)| name.to_lowercase() == key)
            .flat_map(|(_, values)| values.iter().map(String::as_str))
            .collect()
    }

    /// Title, authors, and every tag value, for keyless filters.
    fn all_values(&self) -> Vec<&str> {
        std::iter::once(self.title.as_str())
            .chain(self.authors.iter().map(String::as_str))
            .chain(self.tags.values().flat_map(|v| v.iter().map(String::as_str)))
            .collect()
    }
}

/// One parsed filter token.
///
/// Produced by [`parse_query`]; evaluate with [`Filter::matches`] or
/// [`Filter::matches_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Tag name to restrict the match to, lowercased. `None` means the filter
    /// runs over title, authors, and all tag values.
    pub key: Option<String>,
    /// The value to look for, lowercased.
    pub value: String,
    /// Compare for equality instead of substring containment.
    pub exact: bool,
    /// Invert the result.
    pub exclude: bool,
}

/// Parses a keyword string into its filter list.
///
/// Tokens are split on `;` and trimmed; blank tokens are dropped silently.
///
/// # Examples
///
/// ```rust
/// use hondana::filter::parse_query;
///
/// let filters = parse_query("author:oda; -tag:horror$; piece;");
/// assert_eq!(filters.len(), 3);
/// assert_eq!(filters[0].key.as_deref(), Some("author"));
/// assert!(filters[1].exclude);
/// assert!(filters[1].exact);
/// assert_eq!(filters[2].value, "piece");
/// ```
pub fn parse_query(keywords: &str) -> Vec<Filter> {
    keywords.split(';').filter_map(Filter::parse).collect()
}

impl Filter {
    /// Parses a single token, returning `None` for blank tokens.
    fn parse(token: &str) -> Option<Filter> {
        let mut token = token.trim();
        if token.is_empty() {
            return None;
        }

        let exclude = token.starts_with('-');
        if exclude {
            token = &token[1..];
        }
        let exact = token.ends_with('$');
        if exact {
            token = &token[..token.len() - 1];
        }

        let (key, value) = match token.split_once(':') {
            Some((key, value)) => (Some(key.trim().to_lowercase()), value.trim().to_lowercase()),
            None => (None, token.trim().to_lowercase()),
        };

        if key.is_none() && value.is_empty() {
            return None;
        }

        Some(Filter {
            key,
            value,
            exact,
            exclude,
        })
    }

    /// Evaluates this filter against one entry.
    pub fn matches(&self, entry: &SearchEntry) -> bool {
        let candidates = match &self.key {
            Some(key) => entry.tag_values(key),
            None => entry.all_values(),
        };

        let passes = if self.exact {
            // An exact inclusion passes while the value is absent; exclusion
            // inverts this, so `-tag:x$` keeps entries that do carry `x`.
            !candidates.iter().any(|c| c.to_lowercase() == self.value)
        } else {
            candidates
                .iter()
                .any(|c| c.to_lowercase().contains(&self.value))
        };

        if self.exclude { !passes } else { passes }
    }

    /// Evaluates a filter list against one entry; every filter must pass.
    ///
    /// An empty list matches everything.
    pub fn matches_all(filters: &[Filter], entry: &SearchEntry) -> bool {
        filters.iter().all(|f| f.matches(entry))
    }
}
