// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of [`WebhookStorage`](crate::domain::repository::WebhookStorage).
//!
//! - **InMemoryWebhookStorage** - Thread-safe, process-local storage seeded from
//!   the `webhooks` section of the node config. Events do not survive a restart.

pub mod memory;

pub use memory::InMemoryWebhookStorage;
