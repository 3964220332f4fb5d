/// Recovery orchestration, results and reporting
pub mod batch;
pub mod engine;
pub mod error;
pub mod report;
pub mod result;
pub mod stream;

pub use batch::{recover_batch, recover_batch_with, BatchItem, BatchReport};
pub use engine::{
    default_output_dir, RecoveryConfig, RecoveryEngine, RecoveryProgress, RecoveryStage,
    RecoveryStrategy, DEFAULT_STREAM_NAME,
};
pub use error::RecoveryError;
pub use report::{render_extraction_log, write_extraction_log};
pub use result::{ChecksumStatus, Issue, RecoveredMember, RecoveryResult, RecoveryStatistics};
pub use stream::{extract_stream, extract_stream_file, ExtractedStream, StreamSource, StreamSummary};
