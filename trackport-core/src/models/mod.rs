pub mod export;
pub mod metadata;
pub mod sequence;
