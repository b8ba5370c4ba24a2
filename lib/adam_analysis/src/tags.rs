//! Taint tags.
//!
//! Tags are opaque to the abstract machine: it only unions them when values
//! are joined, merged or copied. Their meaning is given by the built-in
//! class models that create and inspect them.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Tag(u32);

impl Tag {
    /// The value is (derived from) a file name.
    pub const FILE_NAME: Self = Self(0);
    /// The value is (derived from) the content of a file.
    pub const FILE_CONTENT: Self = Self(1);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(tag: Tag) -> Self {
        Self(BTreeSet::from([tag]))
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, tag: Tag) -> bool {
        self.0.contains(&tag)
    }

    #[inline]
    pub fn insert(&mut self, tag: Tag) -> bool {
        self.0.insert(tag)
    }

    /// Adds the tags of `other`, returns `true` if `self` grew.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().copied());
        self.0.len() != before
    }

    #[inline]
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut res = self.clone();
        res.union_with(other);
        res
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Tag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#[")?;
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", tag.0)?;
        }
        write!(f, "]")
    }
}

/// Tag names registry.
#[derive(Debug)]
pub struct TagRegistry {
    names: Vec<String>,
    ids: HashMap<String, Tag>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRegistry {
    /// Builds a registry knowing the predefined tags.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            names: Vec::new(),
            ids: HashMap::new(),
        };
        let file_name = registry.register("file-name");
        let file_content = registry.register("file-content");
        debug_assert_eq!(file_name, Tag::FILE_NAME);
        debug_assert_eq!(file_content, Tag::FILE_CONTENT);
        registry
    }

    pub fn register(&mut self, name: &str) -> Tag {
        if let Some(tag) = self.ids.get(name) {
            return *tag;
        }
        let tag = Tag(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), tag);
        tag
    }

    #[must_use]
    pub fn name(&self, tag: Tag) -> Option<&str> {
        self.names.get(tag.0 as usize).map(String::as_str)
    }

    /// Human readable list of the tags of `tags`.
    #[must_use]
    pub fn describe(&self, tags: &TagSet) -> String {
        tags.iter()
            .map(|tag| self.name(tag).unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predefined_tags() {
        let mut registry = TagRegistry::new();
        assert_eq!(registry.name(Tag::FILE_CONTENT), Some("file-content"));
        assert_eq!(registry.register("file-name"), Tag::FILE_NAME);
        let contact = registry.register("contact");
        let tags: TagSet = [contact, Tag::FILE_NAME].into_iter().collect();
        assert_eq!(registry.describe(&tags), "file-name, contact");
    }

    #[test]
    fn union_reports_growth() {
        let mut a = TagSet::single(Tag::FILE_NAME);
        assert!(!a.union_with(&TagSet::single(Tag::FILE_NAME)));
        assert!(a.union_with(&TagSet::single(Tag::FILE_CONTENT)));
        assert!(a.contains(Tag::FILE_CONTENT));
    }
}
