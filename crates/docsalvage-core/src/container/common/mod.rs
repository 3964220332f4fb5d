/// Shared helpers for container parsing
pub mod types;

pub use types::{find_all, find_from, ByteView, InputImage, MagicDetector};
