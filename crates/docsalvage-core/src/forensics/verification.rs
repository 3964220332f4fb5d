/// Content digests for recovered members
///
/// Every member written to disk records a digest so a later pass can confirm
/// the output still matches what was recovered.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    #[default]
    MD5,
    SHA256,
    SHA512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MD5 => "MD5",
            Self::SHA256 => "SHA256",
            Self::SHA512 => "SHA512",
        }
    }
}

/// Digest of one recovered member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDigest {
    pub algorithm: HashAlgorithm,
    /// Lower-case hex
    pub hash: String,
}

impl MemberDigest {
    pub fn of(data: &[u8], algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            hash: calculate_hash(data, algorithm),
        }
    }

    /// First eight hex digits, for log lines
    pub fn short(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

/// Calculate a digest over a byte slice
pub fn calculate_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::MD5 => format!("{:x}", md5::compute(data)),
        HashAlgorithm::SHA256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::SHA512 => {
            let mut hasher = Sha512::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

/// Calculate a digest over a file, streaming it in 8 KiB chunks
pub fn calculate_file_hash(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut buffer = vec![0; 8192];

    let hash = match algorithm {
        HashAlgorithm::MD5 => {
            let mut hasher = md5::Context::new();
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.consume(&buffer[..n]);
            }
            format!("{:x}", hasher.compute())
        }
        HashAlgorithm::SHA256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::SHA512 => {
            let mut hasher = Sha512::new();
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            format!("{:x}", hasher.finalize())
        }
    };

    Ok(hash)
}

/// Verification status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Output matches the recorded digest
    Verified,
    /// Output differs from the recorded digest
    Corrupted,
    /// Output file is gone
    Missing,
}

/// Verification of a single written member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashVerification {
    pub file_path: String,
    pub expected_hash: String,
    pub actual_hash: Option<String>,
    pub algorithm: HashAlgorithm,
    pub status: VerificationStatus,
}

/// Re-hash a written file and compare it with its recorded digest
pub fn verify_file_integrity(path: impl AsRef<Path>, expected: &MemberDigest) -> HashVerification {
    let path = path.as_ref();
    let actual = calculate_file_hash(path, expected.algorithm).ok();

    let status = match &actual {
        Some(hash) if hash.eq_ignore_ascii_case(&expected.hash) => VerificationStatus::Verified,
        Some(_) => VerificationStatus::Corrupted,
        None => VerificationStatus::Missing,
    };

    HashVerification {
        file_path: path.display().to_string(),
        expected_hash: expected.hash.clone(),
        actual_hash: actual,
        algorithm: expected.algorithm,
        status,
    }
}

/// Verification result with summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verifications: Vec<HashVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total_files: usize,
    pub verified: usize,
    pub corrupted: usize,
    pub missing: usize,
}

impl VerificationResult {
    pub fn from_verifications(verifications: Vec<HashVerification>) -> Self {
        let count = |status| verifications.iter().filter(|v| v.status == status).count();
        let summary = VerificationSummary {
            total_files: verifications.len(),
            verified: count(VerificationStatus::Verified),
            corrupted: count(VerificationStatus::Corrupted),
            missing: count(VerificationStatus::Missing),
        };

        Self {
            verifications,
            summary,
        }
    }

    pub fn all_verified(&self) -> bool {
        self.summary.verified == self.summary.total_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_calculate_hash_from_bytes() {
        let data = b"Hello, World!";

        assert_eq!(
            calculate_hash(data, HashAlgorithm::MD5),
            "65a8e27d8879283831b664bd8b7f0ad4"
        );
        assert_eq!(calculate_hash(data, HashAlgorithm::SHA256).len(), 64);
        assert_eq!(calculate_hash(data, HashAlgorithm::SHA512).len(), 128);
    }

    #[test]
    fn test_file_hash_matches_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, b"Test data").unwrap();

        for algorithm in [HashAlgorithm::MD5, HashAlgorithm::SHA256] {
            assert_eq!(
                calculate_file_hash(&file_path, algorithm).unwrap(),
                calculate_hash(b"Test data", algorithm)
            );
        }
    }

    #[test]
    fn test_verify_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, b"Test data").unwrap();

        let good = MemberDigest::of(b"Test data", HashAlgorithm::SHA256);
        let bad = MemberDigest::of(b"Other data", HashAlgorithm::SHA256);

        let results = VerificationResult::from_verifications(vec![
            verify_file_integrity(&file_path, &good),
            verify_file_integrity(&file_path, &bad),
            verify_file_integrity(temp_dir.path().join("gone.txt"), &good),
        ]);

        assert_eq!(results.verifications[0].status, VerificationStatus::Verified);
        assert_eq!(results.verifications[1].status, VerificationStatus::Corrupted);
        assert_eq!(results.verifications[2].status, VerificationStatus::Missing);
        assert_eq!(results.summary.verified, 1);
        assert!(!results.all_verified());
    }
}
