//! Translation between the client-facing OpenAI chat format and the upstream's.
//!
//! The core of the proxy: builds upstream requests, reshapes single-shot
//! responses, and re-frames streamed events. All translation functions are
//! pure (no I/O).

pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
