use crate::document::{attrs, calculate_digest, DocumentError, Element, ElementKey};
use crate::generation::Generation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Diff is an incremental change between two generations of the same document.
///
/// Applying it is only valid against a document that is exactly at `from`. The result is at `to`
/// and, when `digest` is present, must hash to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub from: Generation,
    pub to: Generation,
    pub changes: Vec<Change>,
    pub digest: Option<String>,
}

/// Paths are keys walked from the document root; the root itself is the empty path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Change {
    SetAttributes {
        path: Vec<ElementKey>,
        attributes: BTreeMap<String, String>,
    },
    Upsert {
        parent: Vec<ElementKey>,
        element: Element,
    },
    Remove {
        path: Vec<ElementKey>,
    },
    /// Used when children cannot be addressed individually (duplicate keys) or were reordered.
    ReplaceChildren {
        path: Vec<ElementKey>,
        children: Vec<Element>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("Diff applies to {expected:?} but the local copy is at {local:?}")]
    BaseMismatch { local: Generation, expected: Generation },
    #[error("Diff target {0:?} does not exist locally")]
    MissingTarget(Vec<ElementKey>),
    #[error("Diff result does not match its digest")]
    DigestMismatch,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl Diff {
    /// Computes the change from `old` to `new`. Generation attributes on the root are carried in
    /// `from`/`to` rather than as attribute changes.
    pub fn compute(old: &Element, new: &Element) -> Result<Diff, DocumentError> {
        let mut changes = Vec::new();
        let mut path = Vec::new();
        diff_element(&mut path, old, new, true, &mut changes);

        Ok(Diff {
            from: Generation::of(old),
            to: Generation::of(new),
            changes,
            digest: Some(calculate_digest(new)?),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.from == self.to
    }
}

fn is_generation_attribute(name: &str) -> bool {
    name == attrs::ADMIN_EPOCH || name == attrs::EPOCH || name == attrs::NUM_UPDATES
}

fn comparable_attributes(element: &Element, is_root: bool) -> BTreeMap<String, String> {
    element
        .attributes()
        .iter()
        .filter(|(k, _)| !(is_root && is_generation_attribute(k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn diff_element(path: &mut Vec<ElementKey>, old: &Element, new: &Element, is_root: bool, out: &mut Vec<Change>) {
    let new_attributes = comparable_attributes(new, is_root);
    if comparable_attributes(old, is_root) != new_attributes {
        out.push(Change::SetAttributes {
            path: path.clone(),
            attributes: new_attributes,
        });
    }

    if old.children() == new.children() {
        return;
    }

    if !old.has_unique_child_keys() || !new.has_unique_child_keys() || reordered(old, new) {
        out.push(Change::ReplaceChildren {
            path: path.clone(),
            children: new.children().to_vec(),
        });
        return;
    }

    for old_child in old.children() {
        let key = old_child.key();
        if new.find_child(&key).is_none() {
            let mut removed = path.clone();
            removed.push(key);
            out.push(Change::Remove { path: removed });
        }
    }

    for new_child in new.children() {
        let key = new_child.key();
        match old.find_child(&key) {
            None => out.push(Change::Upsert {
                parent: path.clone(),
                element: new_child.clone(),
            }),
            Some(old_child) if old_child != new_child => {
                path.push(key);
                diff_element(path, old_child, new_child, false, out);
                path.pop();
            }
            Some(_) => {}
        }
    }
}

/// Applying removals and appends keeps surviving children in their old order and puts new ones
/// at the end. Anything else has to be sent as a full child list.
fn reordered(old: &Element, new: &Element) -> bool {
    let mut expected: Vec<ElementKey> = old
        .children()
        .iter()
        .map(Element::key)
        .filter(|k| new.find_child(k).is_some())
        .collect();
    expected.extend(
        new.children()
            .iter()
            .map(Element::key)
            .filter(|k| old.find_child(k).is_none()),
    );
    let actual: Vec<ElementKey> = new.children().iter().map(Element::key).collect();
    expected != actual
}

fn resolve_mut<'a>(doc: &'a mut Element, path: &[ElementKey]) -> Result<&'a mut Element, DiffError> {
    let mut current = doc;
    for key in path {
        current = match current.find_child_mut(key) {
            Some(child) => child,
            None => return Err(DiffError::MissingTarget(path.to_vec())),
        };
    }
    Ok(current)
}

/// Applies `diff` to a copy of `doc`. `doc` itself is never touched, so a failure leaves the
/// caller's document exactly as it was.
pub fn apply_diff(doc: &Element, diff: &Diff) -> Result<Element, DiffError> {
    let local = Generation::of(doc);
    if local != diff.from {
        return Err(DiffError::BaseMismatch {
            local,
            expected: diff.from,
        });
    }

    let mut result = doc.clone();
    for change in diff.changes.iter() {
        match change {
            Change::SetAttributes { path, attributes } => {
                let target = resolve_mut(&mut result, path)?;
                let mut attributes = attributes.clone();
                if path.is_empty() {
                    for name in [attrs::ADMIN_EPOCH, attrs::EPOCH, attrs::NUM_UPDATES].iter() {
                        if let Some(v) = target.attr(name) {
                            attributes.insert(name.to_string(), v.to_string());
                        }
                    }
                }
                target.replace_attributes(attributes);
            }
            Change::Upsert { parent, element } => {
                resolve_mut(&mut result, parent)?.upsert_child(element.clone());
            }
            Change::Remove { path } => {
                let (key, parent) = match path.split_last() {
                    Some(split) => split,
                    None => return Err(DiffError::MissingTarget(Vec::new())),
                };
                if resolve_mut(&mut result, parent)?.remove_child(key).is_none() {
                    return Err(DiffError::MissingTarget(path.clone()));
                }
            }
            Change::ReplaceChildren { path, children } => {
                resolve_mut(&mut result, path)?.replace_children(children.clone());
            }
        }
    }

    diff.to.write_to(&mut result);

    if let Some(expected) = &diff.digest {
        if &calculate_digest(&result)? != expected {
            return Err(DiffError::DigestMismatch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{empty_document, find_section_mut, section_path};

    fn with_node(doc: &Element, id: &str, uname: &str) -> Element {
        let mut next = doc.clone();
        let path = section_path(Some("nodes"), false).unwrap();
        find_section_mut(&mut next, &path)
            .unwrap()
            .upsert_child(Element::new("node").with_attr("id", id).with_attr("uname", uname));
        let generation = Generation::of(&next).incremented();
        generation.write_to(&mut next);
        next
    }

    #[test]
    fn applied_diff_reproduces_new_document() {
        let old = empty_document();
        let new = with_node(&old, "n1", "alpha");

        let diff = Diff::compute(&old, &new).unwrap();
        let applied = apply_diff(&old, &diff).unwrap();

        assert_eq!(applied, new);
        assert_eq!(diff.from, Generation::new(0, 0, 0));
        assert_eq!(diff.to, Generation::new(0, 0, 1));
    }

    #[test]
    fn second_application_is_refused() {
        let old = empty_document();
        let new = with_node(&old, "n1", "alpha");
        let diff = Diff::compute(&old, &new).unwrap();

        let once = apply_diff(&old, &diff).unwrap();
        let twice = apply_diff(&once, &diff);

        assert!(matches!(twice, Err(DiffError::BaseMismatch { .. })));
    }

    #[test]
    fn stale_base_is_refused() {
        let base = empty_document();
        let mut local = base.clone();
        Generation::new(0, 0, 5).write_to(&mut local);
        let mut incoming_base = base;
        Generation::new(0, 0, 3).write_to(&mut incoming_base);
        let incoming_new = with_node(&incoming_base, "n1", "alpha");

        let diff = Diff::compute(&incoming_base, &incoming_new).unwrap();

        match apply_diff(&local, &diff) {
            Err(DiffError::BaseMismatch { local, expected }) => {
                assert_eq!(local, Generation::new(0, 0, 5));
                assert_eq!(expected, Generation::new(0, 0, 3));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn removals_and_attribute_changes_round_out() {
        let start = with_node(&with_node(&empty_document(), "n1", "alpha"), "n2", "beta");
        let mut end = start.clone();
        let path = section_path(Some("nodes"), false).unwrap();
        let nodes = find_section_mut(&mut end, &path).unwrap();
        nodes.remove_child(&ElementKey::new("node", Some("n1".into())));
        nodes
            .find_child_mut(&ElementKey::new("node", Some("n2".into())))
            .unwrap()
            .set_attr("uname", "gamma");
        end.set_attr("dc-uuid", "n2");
        Generation::of(&end).incremented().write_to(&mut end);

        let diff = Diff::compute(&start, &end).unwrap();

        assert_eq!(apply_diff(&start, &diff).unwrap(), end);
    }

    #[test]
    fn tampered_digest_is_detected() {
        let old = empty_document();
        let new = with_node(&old, "n1", "alpha");
        let mut diff = Diff::compute(&old, &new).unwrap();
        diff.digest = Some("0".repeat(64));

        assert!(matches!(apply_diff(&old, &diff), Err(DiffError::DigestMismatch)));
    }
}
