pub mod capacity;
pub mod drive;
pub mod fetcher;
pub mod normalizer;
pub mod upload;
