use crate::call::{CallOptions, CibMessage, Payload};
use crate::document::{find_section, section_path, tags, Diff, Element};

/// PreparedInput is what an operation gets to work on after the request was unpacked.
#[derive(Debug, Default)]
pub(crate) struct PreparedInput {
    pub(crate) data: Option<Element>,
    pub(crate) diff: Option<Diff>,
    pub(crate) section: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum PrepareKind {
    /// Nothing is extracted.
    None,
    /// The calldata document, unwrapped from a fragment and narrowed to the section.
    Data,
    /// Like `None`, for the sync family of operations.
    Sync,
    /// The diff, from `update_diff` for global updates and from calldata otherwise.
    Diff,
}

pub(crate) fn prepare(logger: &slog::Logger, kind: PrepareKind, request: &CibMessage) -> PreparedInput {
    let section = request.section.clone();
    match kind {
        PrepareKind::None | PrepareKind::Sync => PreparedInput {
            section,
            ..PreparedInput::default()
        },
        PrepareKind::Data => PreparedInput {
            data: prepare_data(logger, request),
            diff: None,
            section,
        },
        PrepareKind::Diff => PreparedInput {
            data: None,
            diff: prepare_diff(logger, request),
            section,
        },
    }
}

fn prepare_data(logger: &slog::Logger, request: &CibMessage) -> Option<Element> {
    let root = request.document()?;

    let data = if root.name() == tags::FRAGMENT {
        match root.child(tags::CIB) {
            Some(cib) => cib,
            None => {
                slog::debug!(logger, "Fragment carried no document");
                return None;
            }
        }
    } else {
        root
    };

    if data.name() != tags::CIB {
        return Some(data.clone());
    }

    // A whole document was sent along with a section: only that section is used.
    match request.section.as_deref() {
        None => Some(data.clone()),
        Some(section) => {
            let xpath = request.call_options.contains(CallOptions::XPATH);
            match section_path(Some(section), xpath) {
                Ok(path) => find_section(data, &path).cloned(),
                Err(e) => {
                    slog::debug!(logger, "Not narrowing input: {}", e);
                    Some(data.clone())
                }
            }
        }
    }
}

fn prepare_diff(logger: &slog::Logger, request: &CibMessage) -> Option<Diff> {
    let diff = if request.global_update {
        request.update_diff.clone()
    } else {
        match &request.calldata {
            Some(Payload::Diff(diff)) => Some(diff.clone()),
            _ => request.update_diff.clone(),
        }
    };

    if diff.is_none() {
        slog::warn!(
            logger,
            "No diff supplied with '{}' (global update: {})",
            request.operation,
            request.global_update
        );
    }
    diff
}
