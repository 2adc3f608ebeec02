// Copyright 2026 Listing Sentinel Contributors
// SPDX-License-Identifier: Apache-2.0

//! Listing Sentinel watches a marketplace search for new listings.
//!
//! A run walks an ordered chain of acquisition strategies and stops at the
//! first one that yields records. The rendered-page stage leaves its snapshot
//! behind for the heuristic scanner. Records are normalized into
//! [`listing::Listing`] and only never-seen ones pass the
//! [`gate::DispatchGate`].

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod extraction;
pub mod gate;
pub mod http_client;
pub mod listing;
pub mod notifier;
pub mod orchestrator;
pub mod pipeline;
pub mod renderer;
pub mod stealth;
pub mod store;
pub mod strategy;
