// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod types;
