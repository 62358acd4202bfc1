use crate::document::{attrs, Element};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation is the version triple of a document. Ordering is lexicographic over
/// `(admin_epoch, epoch, num_updates)`, which is exactly the derived `Ord` given the field order.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation {
    pub admin_epoch: u32,
    pub epoch: u32,
    pub num_updates: u32,
}

impl Generation {
    pub fn new(admin_epoch: u32, epoch: u32, num_updates: u32) -> Self {
        Generation {
            admin_epoch,
            epoch,
            num_updates,
        }
    }

    /// Reads the generation attributes of `doc`. Missing or unparsable attributes count as 0, so a
    /// fresh document is (0,0,0) and never newer than a peer's real copy.
    pub fn of(doc: &Element) -> Self {
        Generation {
            admin_epoch: read_counter(doc, attrs::ADMIN_EPOCH),
            epoch: read_counter(doc, attrs::EPOCH),
            num_updates: read_counter(doc, attrs::NUM_UPDATES),
        }
    }

    /// Names of the generation attributes that are absent from `doc`.
    pub fn missing_attributes(doc: &Element) -> Vec<&'static str> {
        [attrs::ADMIN_EPOCH, attrs::EPOCH, attrs::NUM_UPDATES]
            .iter()
            .copied()
            .filter(|name| doc.attr(name).is_none())
            .collect()
    }

    pub fn write_to(&self, doc: &mut Element) {
        doc.set_attr(attrs::ADMIN_EPOCH, self.admin_epoch.to_string());
        doc.set_attr(attrs::EPOCH, self.epoch.to_string());
        doc.set_attr(attrs::NUM_UPDATES, self.num_updates.to_string());
    }

    /// Next epoch boundary: epoch + 1, num_updates reset.
    pub fn bumped(&self) -> Self {
        Generation {
            admin_epoch: self.admin_epoch,
            epoch: self.epoch.saturating_add(1),
            num_updates: 0,
        }
    }

    /// One more local update within the current epoch.
    pub fn incremented(&self) -> Self {
        Generation {
            admin_epoch: self.admin_epoch,
            epoch: self.epoch,
            num_updates: self.num_updates.saturating_add(1),
        }
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.admin_epoch, self.epoch, self.num_updates)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn read_counter(doc: &Element, name: &str) -> u32 {
    doc.attr(name).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Advances the document to the next epoch and returns the new generation.
pub fn bump(doc: &mut Element) -> Generation {
    let next = Generation::of(doc).bumped();
    next.write_to(doc);
    next
}

/// Copy of `doc` with num_updates forced to "0". The on-disk copy only records epoch boundaries;
/// the live document keeps its counters.
pub fn stamp_for_write(doc: &Element) -> Element {
    let mut stamped = doc.clone();
    stamped.set_attr(attrs::NUM_UPDATES, "0");
    stamped
}
