pub mod domain;
pub mod ports;
pub mod storage_path;

pub use domain::{
    AiProvider, Attachment, AttachmentKind, Difficulty, DownloadEvent, ExamGeneration,
    ExamMetadata, GenerationRequest, NewExamGeneration, NewSubmission, Profile, QuestionCount,
    StoredMaterialFile, StoredObject, Submission,
};
pub use ports::{
    Composition, DatabaseService, DocumentRenderer, ExamPrompt, ExamWriter, FragmentStream,
    IdentityProvider, ObjectStore, PortError, PortResult,
};
pub use storage_path::OneOrMany;
