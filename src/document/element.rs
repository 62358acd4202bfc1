use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Element is one node of the configuration tree.
///
/// Attributes are kept in a sorted map so that serialization (and with it the digest) does not
/// depend on insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Element>,
}

/// ElementKey identifies a child among its siblings: element name plus optional `id` attribute.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementKey {
    pub name: String,
    pub id: Option<String>,
}

impl ElementKey {
    pub fn new<N: Into<String>>(name: N, id: Option<String>) -> Self {
        ElementKey { name: name.into(), id }
    }

    pub fn named<N: Into<String>>(name: N) -> Self {
        Self::new(name, None)
    }

    fn matches(&self, element: &Element) -> bool {
        self.name == element.name && self.id.as_deref() == element.attr(ID_ATTR)
    }
}

impl fmt::Debug for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            None => write!(f, "{}", self.name),
            Some(id) => write!(f, "{}[{}]", self.name, id),
        }
    }
}

const ID_ATTR: &str = "id";

impl Element {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Element {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::new(self.name.clone(), self.attr(ID_ATTR).map(String::from))
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attr<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn replace_attributes(&mut self, attributes: BTreeMap<String, String>) {
        self.attributes = attributes;
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        &mut self.children
    }

    pub fn replace_children(&mut self, children: Vec<Element>) {
        self.children = children;
    }

    /// First child with the given element name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn find_child(&self, key: &ElementKey) -> Option<&Element> {
        self.children.iter().find(|c| key.matches(c))
    }

    pub fn find_child_mut(&mut self, key: &ElementKey) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| key.matches(c))
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Replaces the child with the same key in place, or appends when there is none.
    pub fn upsert_child(&mut self, child: Element) {
        let key = child.key();
        match self.find_child_mut(&key) {
            Some(existing) => *existing = child,
            None => self.children.push(child),
        }
    }

    pub fn remove_child(&mut self, key: &ElementKey) -> Option<Element> {
        let position = self.children.iter().position(|c| key.matches(c))?;
        Some(self.children.remove(position))
    }

    /// Removes every element matching `key` anywhere below this one. Returns how many were removed.
    pub fn remove_descendants(&mut self, key: &ElementKey) -> usize {
        let before = self.children.len();
        self.children.retain(|c| !key.matches(c));
        let mut removed = before - self.children.len();
        for child in self.children.iter_mut() {
            removed += child.remove_descendants(key);
        }
        removed
    }

    /// True when no two children share a key, i.e. every child is individually addressable.
    pub fn has_unique_child_keys(&self) -> bool {
        let mut seen = std::collections::HashSet::with_capacity(self.children.len());
        self.children.iter().all(|c| seen.insert(c.key()))
    }

    /// Copy of this element with attributes only.
    pub fn without_children(&self) -> Element {
        Element {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }

    /// Merges `update` into this element: attributes are overwritten, children are merged
    /// recursively by key and appended when new.
    pub fn merge(&mut self, update: &Element) {
        for (k, v) in update.attributes.iter() {
            self.attributes.insert(k.clone(), v.clone());
        }
        for update_child in update.children.iter() {
            match self.find_child_mut(&update_child.key()) {
                Some(existing) => existing.merge(update_child),
                None => self.children.push(update_child.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Element {
        Element::new("node").with_attr("id", id)
    }

    #[test]
    fn keys_distinguish_ids() {
        let parent = Element::new("nodes").with_child(node("a")).with_child(node("b"));

        assert!(parent.has_unique_child_keys());
        assert_eq!(
            parent.find_child(&ElementKey::new("node", Some("b".into()))),
            Some(&node("b"))
        );
        assert_eq!(parent.find_child(&ElementKey::named("node")), None);
    }

    #[test]
    fn duplicate_keys_detected() {
        let parent = Element::new("nodes").with_child(node("a")).with_child(node("a"));
        assert!(!parent.has_unique_child_keys());
    }

    #[test]
    fn merge_overwrites_and_appends() {
        let mut target = Element::new("nodes").with_child(node("a").with_attr("uname", "old"));
        let update = Element::new("nodes")
            .with_child(node("a").with_attr("uname", "new"))
            .with_child(node("b"));

        target.merge(&update);

        assert_eq!(target.children().len(), 2);
        assert_eq!(target.children()[0].attr("uname"), Some("new"));
        assert_eq!(target.children()[1], node("b"));
    }

    #[test]
    fn remove_descendants_walks_whole_tree() {
        let mut root = Element::new("cib")
            .with_child(Element::new("configuration").with_child(Element::new("nodes").with_child(node("x"))))
            .with_child(Element::new("status").with_child(node("x")));

        let removed = root.remove_descendants(&ElementKey::new("node", Some("x".into())));

        assert_eq!(removed, 2);
    }
}
