// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tier 1 fast processors.
//!
//! | Processor | Runs when | Side effect |
//! |-----------|-----------|-------------|
//! | [`ForwardingProcessor`] | config has forward URLs | POSTs the raw payload to each URL |
//! | [`DowntimeProcessor`] | `auto_downtime` and status `OK` | creates a monitor downtime |

pub mod downtime;
pub mod forwarding;

pub use downtime::DowntimeProcessor;
pub use forwarding::ForwardingProcessor;
