use crate::call::CallOptions;
use crate::document::Element;
use crate::registry::PreparedInput;

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum CleanupKind {
    /// Operations that neither take input nor produce output.
    None,
    /// Input and output are both released.
    Data,
    /// Only the output is released.
    Output,
    /// The output is released when it is a private copy: an xpath result or a childless view.
    Query,
    Sync,
}

/// What cleanup released once the reply was built.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Released {
    pub(crate) input: bool,
    pub(crate) output: bool,
}

/// Releases what prepare and execute produced for one call.
///
/// `output` is whatever was left after the reply took its copy. Operations of the `None` and
/// `Sync` families must not have produced anything; doing so is logged.
pub(crate) fn cleanup(
    logger: &slog::Logger,
    kind: CleanupKind,
    options: CallOptions,
    input: PreparedInput,
    output: Option<Element>,
) -> Released {
    let has_input = input.data.is_some() || input.diff.is_some();
    let has_output = output.is_some();

    let released = match kind {
        CleanupKind::Data => Released {
            input: has_input,
            output: has_output,
        },
        CleanupKind::Output => Released {
            input: false,
            output: has_output,
        },
        CleanupKind::Query => Released {
            input: false,
            output: has_output
                && (options.contains(CallOptions::NO_CHILDREN) || options.contains(CallOptions::XPATH)),
        },
        CleanupKind::None | CleanupKind::Sync => {
            if has_input || has_output {
                slog::warn!(
                    logger,
                    "{:?} operation left input ({}) or output ({}) behind",
                    kind,
                    has_input,
                    has_output
                );
            }
            Released::default()
        }
    };

    drop(input);
    drop(output);
    released
}
