/// ZIP-like inner archive reconstruction from local headers
pub mod extractor;
pub mod scanner;
pub mod sink;
pub mod structures;

pub use extractor::{inflate, ArchiveReconstructor, ExtractOptions, ReconstructionReport};
pub use scanner::{local_header_offsets, CandidateMember, LocalHeaderScanner, ScanEvent};
pub use sink::{sanitize_member_path, DirectorySink, MemorySink, OutputSink};
pub use structures::{CompressionMethod, LocalFileHeader};
