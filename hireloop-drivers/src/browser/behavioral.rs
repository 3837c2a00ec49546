use fantoccini::elements::Element;
use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Human-like pauses and key-by-key typing for form input.
#[derive(Debug, Clone)]
pub struct BehavioralEngine {
    key_delay_ms: (u64, u64),
}

impl Default for BehavioralEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {
            key_delay_ms: (30, 150),
        }
    }

    /// Random duration between `min` and `max` milliseconds, inclusive.
    pub fn pick_delay(&self, min: u64, max: u64) -> Duration {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Duration::from_millis(OsRng.gen_range(lo..=hi))
    }

    pub async fn random_delay(&self, min: u64, max: u64) {
        sleep(self.pick_delay(min, max)).await;
    }

    /// Type the provided text with small random delays between characters.
    pub async fn type_text_human_like(
        &self,
        element: &Element,
        text: &str,
    ) -> Result<(), fantoccini::error::CmdError> {
        let (min, max) = self.key_delay_ms;
        for ch in text.chars() {
            element.send_keys(&ch.to_string()).await?;
            self.random_delay(min, max).await;
        }
        Ok(())
    }
}
