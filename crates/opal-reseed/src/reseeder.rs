//! Reseeder
//!
//! Drives one bootstrap round: pick a host, fetch `i2pseeds.su3`, ingest
//! whatever descriptors the archive yields. Runs before the transport
//! ever dials anyone, so the netdb has routers to dial.

use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{info, warn};

use opal_core::NetDb;

use crate::config::ReseedConfig;
use crate::errors::ReseedResult;
use crate::http::HttpClient;
use crate::su3::ingest_su3;

/// SU3 fetcher and ingester
pub struct Reseeder {
    config: ReseedConfig,
    http: Arc<dyn HttpClient>,
    netdb: Arc<dyn NetDb>,
}

impl Reseeder {
    /// Create a reseeder around its collaborators
    pub fn new(config: ReseedConfig, http: Arc<dyn HttpClient>, netdb: Arc<dyn NetDb>) -> Self {
        Self {
            config,
            http,
            netdb,
        }
    }

    /// Fetch one archive from a randomly chosen host and ingest it.
    /// Returns the number of descriptors handed to the netdb.
    pub async fn reseed_once(&self) -> usize {
        let Some(host) = self.config.hosts.choose(&mut rand::thread_rng()).cloned() else {
            warn!("no reseed hosts configured");
            return 0;
        };
        info!("downloading SU3 from {}", host);
        let url = format!("{}i2pseeds.su3", host);
        match self.http.get(&url).await {
            Ok(body) if !body.is_empty() => self.ingest_archive(&body),
            Ok(_) => {
                warn!("SU3 download failed: empty response");
                0
            }
            Err(e) => {
                warn!("SU3 download failed: {}", e);
                0
            }
        }
    }

    /// Ingest an archive already held in memory
    pub fn ingest_archive(&self, data: &[u8]) -> usize {
        ingest_su3(data, self.netdb.as_ref())
    }

    /// Ingest an archive from a local file
    pub fn ingest_file(&self, path: &std::path::Path) -> ReseedResult<usize> {
        let data = std::fs::read(path)?;
        Ok(self.ingest_archive(&data))
    }
}
