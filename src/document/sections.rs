use crate::document::Element;

pub mod tags {
    pub const CIB: &str = "cib";
    pub const CONFIGURATION: &str = "configuration";
    pub const CRM_CONFIG: &str = "crm_config";
    pub const NODES: &str = "nodes";
    pub const RESOURCES: &str = "resources";
    pub const CONSTRAINTS: &str = "constraints";
    pub const STATUS: &str = "status";
    pub const FRAGMENT: &str = "cib_fragment";
}

pub mod attrs {
    pub const ADMIN_EPOCH: &str = "admin_epoch";
    pub const EPOCH: &str = "epoch";
    pub const NUM_UPDATES: &str = "num_updates";
    pub const LAST_WRITTEN: &str = "cib-last-written";
    pub const VALIDATE_WITH: &str = "validate-with";
}

/// Schemas in ascending order. `upgrade` moves a document to the last one.
pub const KNOWN_SCHEMAS: &[&str] = &["cib-0.6", "cib-1.0", "cib-1.1"];

pub fn latest_schema() -> &'static str {
    KNOWN_SCHEMAS[KNOWN_SCHEMAS.len() - 1]
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SectionError {
    #[error("Unknown section '{0}'")]
    UnknownSection(String),
    #[error("Path '{0}' does not start at the document root")]
    NotRooted(String),
}

/// Standard empty document at generation (0,0,0).
pub fn empty_document() -> Element {
    Element::new(tags::CIB)
        .with_attr(attrs::ADMIN_EPOCH, "0")
        .with_attr(attrs::EPOCH, "0")
        .with_attr(attrs::NUM_UPDATES, "0")
        .with_attr(attrs::VALIDATE_WITH, latest_schema())
        .with_child(
            Element::new(tags::CONFIGURATION)
                .with_child(Element::new(tags::CRM_CONFIG))
                .with_child(Element::new(tags::NODES))
                .with_child(Element::new(tags::RESOURCES))
                .with_child(Element::new(tags::CONSTRAINTS)),
        )
        .with_child(Element::new(tags::STATUS))
}

/// Resolves a request's section to element names walked from the root. An empty path is the whole
/// document.
///
/// Plain section names are looked up in the fixed layout. With `xpath` the section is a
/// `/`-separated path that has to start at `/cib`.
pub fn section_path(section: Option<&str>, xpath: bool) -> Result<Vec<String>, SectionError> {
    let section = match section {
        None => return Ok(Vec::new()),
        Some(s) => s,
    };

    if xpath {
        let mut steps = section.split('/').filter(|s| !s.is_empty());
        if steps.next() != Some(tags::CIB) {
            return Err(SectionError::NotRooted(section.to_string()));
        }
        return Ok(steps.map(String::from).collect());
    }

    let path: &[&str] = match section {
        "" | "all" | tags::CIB => &[],
        tags::CONFIGURATION => &[tags::CONFIGURATION],
        tags::STATUS => &[tags::STATUS],
        tags::CRM_CONFIG => &[tags::CONFIGURATION, tags::CRM_CONFIG],
        tags::NODES => &[tags::CONFIGURATION, tags::NODES],
        tags::RESOURCES => &[tags::CONFIGURATION, tags::RESOURCES],
        tags::CONSTRAINTS => &[tags::CONFIGURATION, tags::CONSTRAINTS],
        unknown => return Err(SectionError::UnknownSection(unknown.to_string())),
    };

    Ok(path.iter().map(|s| s.to_string()).collect())
}

pub fn find_section<'a>(doc: &'a Element, path: &[String]) -> Option<&'a Element> {
    let mut current = doc;
    for step in path {
        current = current.child(step)?;
    }
    Some(current)
}

pub fn find_section_mut<'a>(doc: &'a mut Element, path: &[String]) -> Option<&'a mut Element> {
    let mut current = doc;
    for step in path {
        current = current.child_mut(step)?;
    }
    Some(current)
}

/// Walks `path`, creating missing elements on the way.
pub fn create_section<'a>(doc: &'a mut Element, path: &[String]) -> &'a mut Element {
    let mut current = doc;
    for step in path {
        let position = match current.children().iter().position(|c| c.name() == step) {
            Some(position) => position,
            None => {
                current.push_child(Element::new(step.as_str()));
                current.children().len() - 1
            }
        };
        current = &mut current.children_mut()[position];
    }
    current
}

/// Adds an empty status section when missing. Returns true if one was added.
pub fn ensure_status(doc: &mut Element) -> bool {
    if doc.child(tags::STATUS).is_some() {
        return false;
    }
    doc.push_child(Element::new(tags::STATUS));
    true
}

/// The part of a document that is written to disk: everything but the status section.
pub fn without_status(doc: &Element) -> Element {
    let mut copy = doc.clone();
    copy.remove_child(&crate::document::ElementKey::named(tags::STATUS));
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_sections_resolve() {
        assert_eq!(section_path(None, false).unwrap(), Vec::<String>::new());
        assert_eq!(section_path(Some("cib"), false).unwrap(), Vec::<String>::new());
        assert_eq!(
            section_path(Some("nodes"), false).unwrap(),
            vec!["configuration".to_string(), "nodes".to_string()]
        );
        assert_eq!(
            section_path(Some("bogus"), false),
            Err(SectionError::UnknownSection("bogus".into()))
        );
    }

    #[test]
    fn xpath_sections_resolve() {
        assert_eq!(
            section_path(Some("/cib/configuration/resources"), true).unwrap(),
            vec!["configuration".to_string(), "resources".to_string()]
        );
        assert!(matches!(
            section_path(Some("/configuration"), true),
            Err(SectionError::NotRooted(_))
        ));
    }

    #[test]
    fn create_section_builds_missing_path() {
        let mut doc = Element::new("cib");
        let path = section_path(Some("constraints"), false).unwrap();

        create_section(&mut doc, &path).push_child(Element::new("rsc_location"));

        let found = find_section(&doc, &path).unwrap();
        assert_eq!(found.children().len(), 1);
    }

    #[test]
    fn status_is_stripped_and_restored() {
        let doc = empty_document();
        let mut stripped = without_status(&doc);

        assert!(stripped.child(tags::STATUS).is_none());
        assert!(ensure_status(&mut stripped));
        assert!(!ensure_status(&mut stripped));
    }
}
