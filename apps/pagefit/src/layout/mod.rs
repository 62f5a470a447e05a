// Page budget: estimation, deterministic trimming and adaptive reduction.
// The estimator and trimmer are pure; the reducer awaits only the ranker.

pub mod audit;
pub mod candidates;
pub mod estimator;
pub mod fallback;
pub mod handlers;
pub mod policy;
pub mod prompts;
pub mod ranking;
pub mod reducer;
pub mod trimmer;

pub use ranking::{KeywordContentRanker, LlmContentRanker};
