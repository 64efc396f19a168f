//! Text codecs shared by the orchestrator and the reconciler.
//!
//! - [`payload`]: entry tokens, list signatures, and the combined payload
//!   passed to the batch processor.
//! - [`progress`]: classification of the processor's streamed output lines.

pub mod payload;
pub mod progress;

pub use payload::{
    combined_payload, normalize_account_input, normalize_installment_input, participating_tokens,
    payload_token, payload_with_mode, signature, MAX_ACCOUNT_DIGITS,
};
pub use progress::{classify_line, first_meaningful_line, ProgressEvent, GENERIC_FAILURE};
