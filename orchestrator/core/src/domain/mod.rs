// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: alert model, agent contracts, classification and the RLM loop.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types, ports and loop logic; no HTTP or storage backends

pub mod agent;
pub mod alert;
pub mod alerting;
pub mod classifier;
pub mod node_config;
pub mod repository;
pub mod rlm;
pub mod webhook;
