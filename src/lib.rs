//! Groq-Bot is a terminal chat client that streams replies from
//! Groq-hosted language models.
//!
//! - [`conversation`] keeps the transcript sent to the provider and the
//!   display log shown to the user, in lock-step.
//! - [`streaming`] decodes the provider's server-sent events into
//!   [`fragment`]s, and [`accumulator`] folds them into cumulative snapshots.
//! - [`llm`] talks to the OpenAI-compatible endpoint.
//! - [`session`] ties one user submission to one recorded reply.
//! - [`ui`] is the full-screen interface; [`repl`] is the plain line mode.

pub mod accumulator;
pub mod config;
pub mod conversation;
pub mod events;
pub mod fragment;
pub mod llm;
pub mod repl;
pub mod session;
pub mod streaming;
pub mod ui;
