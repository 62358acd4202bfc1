mod codec;
mod diff;
mod digest;
mod element;
mod sections;

pub use codec::parse;
pub use codec::serialize;
pub use codec::DocumentError;
pub use diff::apply_diff;
pub use diff::Change;
pub use diff::Diff;
pub use diff::DiffError;
pub use digest::calculate_digest;
pub use digest::digest_of_bytes;
pub use element::Element;
pub use element::ElementKey;
pub use sections::attrs;
pub use sections::create_section;
pub use sections::empty_document;
pub use sections::ensure_status;
pub use sections::find_section;
pub use sections::find_section_mut;
pub use sections::latest_schema;
pub use sections::section_path;
pub use sections::tags;
pub use sections::without_status;
pub use sections::SectionError;
pub use sections::KNOWN_SCHEMAS;
