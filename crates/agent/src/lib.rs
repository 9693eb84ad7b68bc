//! Agent layer - turns a natural-language question into CRM records.
//!
//! - `llm`: the completion seam and a scripted test double
//! - `openai`: chat-completions client for Groq, OpenAI and Ollama
//! - `translator`: prompt contract and descriptor parsing
//! - `pipeline`: translate → execute with a top-level safety net
//!
//! The LLM only produces query parameters. Validation, dispatch and record
//! normalization are deterministic and live in `crmquery-core`.

pub mod llm;
pub mod openai;
pub mod pipeline;
pub mod translator;

pub use llm::{CompletionRequest, LlmClient, ScriptedLlmClient};
pub use openai::OpenAiCompatibleClient;
pub use pipeline::QueryPipeline;
pub use translator::{QueryTranslator, TranslatorSettings, SYSTEM_PROMPT};
