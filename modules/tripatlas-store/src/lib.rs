pub mod models;
pub mod store;

pub use models::*;
pub use store::{AtlasStore, CommitRecord, DecisionInput, NewReview, ReviewFilter};
