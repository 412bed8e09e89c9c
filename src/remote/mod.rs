// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote acceptance service.
//!
//! The remote side must treat repeated deliveries of the same record id as an
//! upsert: a record whose local flip failed after acceptance is delivered
//! again on the next pass.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::IdentifiedRecord;

pub use http::HttpRemote;

/// Why a single delivery did not result in acceptance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The remote answered and refused the record
    #[error("rejected by remote: {0}")]
    Rejected(String),
    /// The remote could not be reached
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    /// The transport gave up waiting
    #[error("delivery timed out")]
    Timeout,
}

impl DeliveryError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout => "timeout",
        }
    }
}

#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Deliver one record. `Ok` means the remote accepted it.
    async fn deliver(&self, record: &IdentifiedRecord) -> Result<(), DeliveryError>;

    /// Cheap reachability check used by the health probe.
    async fn health_check(&self) -> bool {
        true
    }
}
