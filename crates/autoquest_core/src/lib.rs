pub mod config;
pub mod embed;
pub mod error;
pub mod generate;
pub mod index;
pub mod model;
pub mod normalize;
pub mod question;
pub mod resolve;
pub mod retrieval;
pub mod storage;
pub mod store;

pub use config::{Config, EmbeddingBackend};
pub use embed::{EmbeddingProvider, HashEmbeddingProvider, OllamaEmbeddingProvider};
pub use error::{AutoQuestError, Result};
pub use generate::{render_prompt, GenerativeFallback, OllamaGenerator, INSTRUCTION_TEMPLATE};
pub use index::VectorIndex;
pub use model::{AnswerRecord, AnswerSource, IndexEntry, Resolution, SimilarMatch};
pub use normalize::{normalize, normalize_detailed, Normalized, Rule};
pub use question::{embedded_id, is_binary_choice, question_key, strip_options};
pub use resolve::Resolver;
pub use retrieval::{cosine_similarity, top_k, SimilarityIndex};
pub use store::AnswerStore;
