//! Pipeline roles built on the generation-service boundary.
//!
//! - **Response Parser**: structured payloads out of free-form replies, with
//!   a fallback that never loses the raw text
//! - **Worker**: one finding per sub-task
//! - **Validator**: critique of the aggregated findings
//! - **Synthesizer**: the final [`Report`]
//!
//! Every role owns a [`RoleChannel`] (or any other
//! [`Conversant`](vigil_common::Conversant)) exclusively, so its conversation
//! state belongs to exactly one run at a time.
//!
//! ```text
//! artifact ─▶ decompose ─▶ Worker × N ─▶ aggregate ─▶ Validator ─▶ Synthesizer ─▶ Report
//!                 │                                                    │
//!                 └─────────────────────── parser ─────────────────────┘
//! ```

pub mod channel;
pub mod parser;
pub mod prompts;
pub mod render;
pub mod report;
pub mod synthesizer;
pub mod validator;
pub mod worker;

pub use channel::RoleChannel;
pub use parser::{parse, ExpectedShape, FieldSpec, Parsed};
pub use render::render_markdown;
pub use report::{aggregate_findings, Content, Report};
pub use synthesizer::Synthesizer;
pub use validator::Validator;
pub use worker::{Worker, WorkerContext};
