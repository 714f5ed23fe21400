//! Periodic self-ping for hosts that idle out quiet services

use crate::error::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct KeepAlive {
    client: reqwest::Client,
    url: String,
    every: Duration,
}

impl KeepAlive {
    pub fn new(url: &str, every: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            every,
        })
    }

    /// One ping; returns the HTTP status code
    pub async fn ping(&self) -> Result<u16> {
        let response = self.client.get(&self.url).send().await?;
        Ok(response.status().as_u16())
    }

    /// Ping forever. Failures are logged and never end the loop.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the service just started
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.ping().await {
                Ok(code) if (200..400).contains(&code) => debug!("Keep-alive ping ok ({})", code),
                Ok(code) => warn!("Keep-alive ping to {} returned {}", self.url, code),
                Err(e) => warn!("Keep-alive ping to {} failed: {}", self.url, e),
            }
        }
    }
}
