//! Pipeline orchestration, content identity and the per-stage call policy

mod content_id;
mod orchestrator;
mod policy;

pub use content_id::{compute_content_id, is_content_id, ContentIdentifier, CONTENT_ID_LEN};
pub use orchestrator::{Collaborators, Pipeline};
pub use policy::StagePolicy;
