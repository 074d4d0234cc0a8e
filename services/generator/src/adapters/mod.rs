pub mod db;
pub mod http;
pub mod memory;
pub mod prompts;

pub use db::SqliteStore;
pub use http::ReqwestTransport;
pub use memory::MemoryStore;
pub use prompts::TemplatePromptBuilder;
