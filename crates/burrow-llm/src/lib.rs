// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! LLM providers and the synthesis step.
//!
//! Providers implement a single one-shot [`Provider::complete`] contract;
//! selection is by configuration name. The [`Synthesizer`] seam is the
//! executor's only coupling to LLMs: either the deterministic passthrough
//! renderer (no model involved) or an LLM-backed variant that, for
//! `privacy: remote` providers, strips source attribution from the prompt
//! before it leaves the host.

mod http;
mod provider;
mod synthesize;

pub use http::HttpProvider;
pub use provider::{PassthroughProvider, Provider};
pub use synthesize::{
    build_synthesizer, Collected, CollectedSection, LlmSynthesizer, PassthroughSynthesizer,
    Synthesizer,
};
