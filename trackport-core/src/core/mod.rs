pub mod alignment;
pub mod batch;
pub mod descriptor;
pub mod export;
pub mod frames;
pub mod ground_truth;
pub mod metadata;
pub mod partition;
pub mod serializer;
pub mod tracks;
pub mod verify;
