use crate::domain::errors::GatewayError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::warn;

/// Process-wide sliding-window budget for outbound advisory calls.
///
/// Keyed by process, not per provider: the window counts every call the
/// gateway makes regardless of where it lands. Saturated acquires either
/// wait for the window to roll or fail immediately, depending on
/// configuration.
pub struct CallBudget {
    max_per_window: u32,
    window: Duration,
    block_when_saturated: bool,
    recent: Mutex<VecDeque<Instant>>,
}

impl CallBudget {
    pub fn new(max_per_window: u32, block_when_saturated: bool) -> Self {
        Self::with_window(max_per_window, Duration::from_secs(60), block_when_saturated)
    }

    pub fn with_window(max_per_window: u32, window: Duration, block_when_saturated: bool) -> Self {
        Self {
            max_per_window,
            window,
            block_when_saturated,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Reserve one call slot. Returns as soon as the slot is reserved.
    pub async fn acquire(&self) -> Result<(), GatewayError> {
        loop {
            let wait = {
                let mut recent = self.recent.lock().expect("call budget lock poisoned");
                Self::cleanup(&mut recent, self.window);

                if (recent.len() as u32) < self.max_per_window {
                    recent.push_back(Instant::now());
                    return Ok(());
                }

                // Oldest timestamp decides when the window rolls.
                let oldest = *recent.front().expect("saturated window cannot be empty");
                (oldest + self.window).saturating_duration_since(Instant::now())
            };

            if !self.block_when_saturated {
                return Err(GatewayError::CallBudgetExhausted {
                    calls_per_minute: self.max_per_window,
                });
            }

            warn!(
                "CallBudget: saturated ({} calls/window), waiting {:?}",
                self.max_per_window, wait
            );
            time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }

    pub fn in_flight(&self) -> usize {
        let mut recent = self.recent.lock().expect("call budget lock poisoned");
        Self::cleanup(&mut recent, self.window);
        recent.len()
    }

    fn cleanup(recent: &mut VecDeque<Instant>, window: Duration) {
        let cutoff = Instant::now() - window;
        while let Some(&timestamp) = recent.front() {
            if timestamp < cutoff {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_under_limit() {
        let budget = CallBudget::with_window(3, Duration::from_secs(1), false);

        for _ in 0..3 {
            assert!(budget.acquire().await.is_ok());
        }
        assert_eq!(budget.in_flight(), 3);
    }

    #[tokio::test]
    async fn test_fail_fast_when_saturated() {
        let budget = CallBudget::with_window(2, Duration::from_secs(5), false);

        budget.acquire().await.unwrap();
        budget.acquire().await.unwrap();

        let err = budget.acquire().await.unwrap_err();
        assert!(matches!(err, GatewayError::CallBudgetExhausted { .. }));
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_window_roll() {
        let budget = CallBudget::with_window(1, Duration::from_millis(100), true);

        budget.acquire().await.unwrap();

        let start = Instant::now();
        budget.acquire().await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(80),
            "second acquire should have waited for the window to roll"
        );
    }

    #[tokio::test]
    async fn test_window_roll_frees_slots() {
        let budget = CallBudget::with_window(1, Duration::from_millis(50), false);

        budget.acquire().await.unwrap();
        time::sleep(Duration::from_millis(80)).await;
        assert!(budget.acquire().await.is_ok());
    }
}
