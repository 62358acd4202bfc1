use crate::call::{CallOptions, CibMessage, CibStatus};
use crate::document::{
    attrs, create_section, empty_document, ensure_status, find_section, find_section_mut, latest_schema, section_path,
    tags, Element, SectionError,
};
use crate::generation::{self, Generation};
use crate::registry::PreparedInput;
use crate::store::{CibStore, OpOutput};

fn target_path(request: &CibMessage, input: &PreparedInput) -> Result<Vec<String>, CibStatus> {
    let xpath = request.call_options.contains(CallOptions::XPATH);
    section_path(input.section.as_deref(), xpath).map_err(|e| match e {
        SectionError::UnknownSection(_) => CibStatus::NoSection,
        SectionError::NotRooted(_) => CibStatus::InvalidArgument,
    })
}

fn required_data(input: &PreparedInput) -> Result<&Element, CibStatus> {
    input.data.as_ref().ok_or(CibStatus::NoObject)
}

/// The elements an update is about. Sending the section element itself addresses its children.
fn addressed<'a>(section_name: &str, data: &'a Element) -> &'a [Element] {
    if data.name() == section_name {
        data.children()
    } else {
        std::slice::from_ref(data)
    }
}

pub(crate) fn process_query(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let path = target_path(request, input)?;
    let found = match find_section(&store.document, &path) {
        Some(found) => found,
        None if request.call_options.contains(CallOptions::XPATH) => return Err(CibStatus::NoObject),
        None => return Err(CibStatus::NoSection),
    };

    let output = if request.call_options.contains(CallOptions::NO_CHILDREN) {
        found.without_children()
    } else {
        found.clone()
    };
    Ok(OpOutput::with_output(output))
}

pub(crate) fn process_modify(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let data = required_data(input)?;
    let path = target_path(request, input)?;
    let can_create = request.call_options.contains(CallOptions::CAN_CREATE);

    let mut doc = store.document.clone();
    if find_section(&doc, &path).is_none() && !can_create {
        return Err(CibStatus::NoSection);
    }
    let section = create_section(&mut doc, &path);

    if data.name() == section.name() && data.attr("id") == section.attr("id") {
        section.merge(data);
    } else {
        match section.find_child_mut(&data.key()) {
            Some(existing) => existing.merge(data),
            None if can_create => section.push_child(data.clone()),
            None => return Err(CibStatus::NotExists),
        }
    }
    Ok(OpOutput::updated(doc))
}

pub(crate) fn process_create(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let data = required_data(input)?;
    let path = target_path(request, input)?;

    let mut doc = store.document.clone();
    if find_section(&doc, &path).is_none() && !request.call_options.contains(CallOptions::CAN_CREATE) {
        return Err(CibStatus::NoSection);
    }
    let section = create_section(&mut doc, &path);

    let items = addressed(section.name(), data);
    if items.is_empty() {
        return Ok(OpOutput::unchanged());
    }
    if items.iter().any(|item| section.find_child(&item.key()).is_some()) {
        return Err(CibStatus::Exists);
    }
    for item in items {
        section.push_child(item.clone());
    }
    Ok(OpOutput::updated(doc))
}

pub(crate) fn process_delete(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let data = required_data(input)?;
    let path = target_path(request, input)?;

    let mut doc = store.document.clone();
    let section = find_section_mut(&mut doc, &path).ok_or(CibStatus::NoSection)?;

    let items = addressed(section.name(), data);
    if items.is_empty() {
        return Ok(OpOutput::unchanged());
    }
    if items.iter().any(|item| section.find_child(&item.key()).is_none()) {
        return Err(CibStatus::NotExists);
    }
    for item in items {
        section.remove_child(&item.key());
    }
    Ok(OpOutput::updated(doc))
}

pub(crate) fn process_delete_absolute(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let data = required_data(input)?;
    let path = target_path(request, input)?;

    let mut doc = store.document.clone();
    let root = find_section_mut(&mut doc, &path).ok_or(CibStatus::NoSection)?;
    let removed = root.remove_descendants(&data.key());
    slog::debug!(store.logger, "Removed {} instance(s) of {:?}", removed, data.key());

    if removed == 0 {
        return Ok(OpOutput::unchanged());
    }
    Ok(OpOutput::updated(doc))
}

pub(crate) fn process_replace(
    store: &mut CibStore,
    request: &CibMessage,
    input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let data = required_data(input)?;
    let path = target_path(request, input)?;

    if data.name() == tags::CIB {
        let incoming = Generation::of(data);
        let local = store.generation();
        if incoming < local {
            slog::warn!(
                store.logger,
                "Replacement at {} is older than the local copy at {}, ignoring it",
                incoming,
                local
            );
            return Err(CibStatus::OldData);
        }

        let mut doc = data.clone();
        ensure_status(&mut doc);
        if !request.global_update {
            incoming.incremented().write_to(&mut doc);
        }
        return Ok(OpOutput {
            clears_resync: request.global_update,
            ..OpOutput::installed(doc, None)
        });
    }

    if path.is_empty() {
        return Err(CibStatus::InvalidArgument);
    }

    let mut doc = store.document.clone();
    let section = find_section_mut(&mut doc, &path).ok_or(CibStatus::NoSection)?;
    if section.name() != data.name() {
        return Err(CibStatus::InvalidArgument);
    }
    *section = data.clone();
    Ok(OpOutput::updated(doc))
}

pub(crate) fn process_bump(
    store: &mut CibStore,
    _request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let mut doc = store.document.clone();
    let next = generation::bump(&mut doc);
    slog::info!(store.logger, "Bumped to generation {}", next);
    Ok(OpOutput::installed(doc, None))
}

pub(crate) fn process_erase(
    store: &mut CibStore,
    _request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let mut doc = empty_document();
    let next = store.generation().bumped();
    next.write_to(&mut doc);
    slog::warn!(store.logger, "Erasing the document, new generation {}", next);
    Ok(OpOutput::installed(doc, None))
}

pub(crate) fn process_upgrade(
    store: &mut CibStore,
    _request: &CibMessage,
    _input: &PreparedInput,
) -> Result<OpOutput, CibStatus> {
    let latest = latest_schema();
    if store.document.attr(attrs::VALIDATE_WITH) == Some(latest) {
        slog::debug!(store.logger, "Already using {}", latest);
        return Ok(OpOutput::unchanged());
    }

    let mut doc = store.document.clone();
    doc.set_attr(attrs::VALIDATE_WITH, latest);
    generation::bump(&mut doc);
    Ok(OpOutput::installed(doc, None))
}
