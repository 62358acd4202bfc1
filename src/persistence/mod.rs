mod disk_writer;
mod reader;
mod series;
mod writer;

pub(crate) use disk_writer::DiskWriteOutcome;
pub(crate) use disk_writer::DiskWriter;
pub use reader::read_with_recovery;
pub use reader::validate;
pub use reader::CibSource;
pub use reader::ReadError;
pub use reader::RecoveredCib;
pub use series::sig_path;
pub use series::CibFiles;
pub use writer::write_atomic;
pub use writer::WriteError;
pub use writer::WriteSummary;
