/// Integrity features for recovered output
pub mod verification;

pub use verification::{
    calculate_file_hash, calculate_hash, verify_file_integrity, HashAlgorithm, HashVerification,
    MemberDigest, VerificationResult, VerificationStatus, VerificationSummary,
};
