//! Built-in values used when `config.yml` leaves a setting out.

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

pub const EMBEDDING_BASE_URL: &str = "http://127.0.0.1:8090";
pub const EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;
pub const EMBEDDING_CONCURRENCY: usize = 1;

pub const SEARCH_TOP_K: usize = 5;

pub const MAX_CHUNK_SIZE: u64 = 1_000_000;
pub const MAX_EMBEDDING_CONCURRENCY: u64 = 64;
pub const MAX_TOP_K: u64 = 1_000;
