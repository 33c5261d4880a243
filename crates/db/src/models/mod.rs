pub mod annotation_job;
pub mod status;

pub use annotation_job::AnnotationJob;
pub use status::JobStatus;
