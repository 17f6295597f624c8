// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`rayne-core`)
//!
//! HTTP surface that translates inbound webhooks into dispatcher submissions.
//! No business logic lives here; all real work is delegated to
//! `crate::application`.
//!
//! | Route | Method | Description |
//! |-------|--------|-------------|
//! | `/webhooks/receive` | POST | store the alert payload and queue it for processing |
//! | `/webhooks/stats` | GET | dispatcher and agent orchestrator counters |
//! | `/health` | GET | liveness probe |

pub mod api;
