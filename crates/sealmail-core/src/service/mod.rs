//! Services driving the pipeline for open messages and drafts.

mod processor;
mod upload;

pub use processor::{MessageProcessor, StepOutcome};
pub use upload::{
    AttachmentAction, EMBEDDABLE_TYPES, PendingUpload, UploadController, UploadId, UploadTask,
    is_embeddable,
};
