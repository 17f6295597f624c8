// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Rayne alert-analysis orchestrator.
//!
//! # Architecture
//!
//! - **domain:** alert and agent types, role classification, the RLM loop
//! - **application:** agent orchestrator, two-tier processor pipeline, dispatcher
//! - **infrastructure:** sidecar agent, failure alerter, fast processors, storage
//! - **presentation:** HTTP ingress

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
