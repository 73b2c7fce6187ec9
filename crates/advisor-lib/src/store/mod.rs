//! Durable stores for policies and job history
//!
//! Both stores keep their full contents in memory behind one lock and
//! rewrite a JSON document on every mutation while still holding it. The
//! in-memory map only changes after that write succeeds.

mod job_store;
mod persist;
mod policy_store;

pub use job_store::{JobEvent, JobStore};
pub use persist::{read_document, temp_path, write_atomic};
pub use policy_store::{
    cosine_similarity, matches_any_tag, MetadataUpdate, NewPolicy, PolicyStore, SearchHit,
    SearchQuery, EMBEDDING_WEIGHT, TOKEN_WEIGHT,
};
