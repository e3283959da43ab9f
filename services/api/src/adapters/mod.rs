pub mod db;
pub mod gemini_llm;
pub mod identity;
pub mod qwen_llm;
pub mod renderer;
pub mod storage;

pub use db::DbAdapter;
pub use gemini_llm::GeminiExamAdapter;
pub use identity::SupabaseAuth;
pub use qwen_llm::QwenExamAdapter;
pub use renderer::ChromiumRenderer;
pub use storage::SupabaseStorage;
