// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod failure_alerter;
pub mod processors;
pub mod repositories;
pub mod sidecar;

pub use failure_alerter::DatadogFailureAlerter;
pub use repositories::InMemoryWebhookStorage;
pub use sidecar::SidecarAgent;
