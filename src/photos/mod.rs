pub mod api_types;
pub mod cache;
pub mod client;
pub mod types;

pub use cache::CatalogKey;
pub use client::{HttpPhotoClient, PhotoApi};
pub use types::{
  Collection, Page, Photo, PhotoId, ProcessingJob, ProcessingSnapshot, ProviderConfig, ResourceId,
  SingleOutcome,
};
