//! Rate Window
//!
//! Per-second admission control. Remembers when each request in the last
//! second was admitted and refuses more once the per-second cap is reached,
//! so the cap holds over any rolling one-second span, not only over aligned
//! windows. Pure bookkeeping: the caller decides whether to wait.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Rolling per-second admission counter
#[derive(Debug, Clone)]
pub struct RateWindow {
    max_per_second: u32,
    /// Admission instants within the last second, oldest first
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(max_per_second: u32) -> Self {
        RateWindow {
            max_per_second,
            admitted: VecDeque::with_capacity(max_per_second as usize),
        }
    }

    /// Admit one request now. Returns false if the window is full.
    pub fn admit(&mut self) -> bool {
        self.admit_at(Instant::now(), 1)
    }

    /// Admit `n` requests together, or none of them.
    pub fn admit_many(&mut self, n: u32) -> bool {
        self.admit_at(Instant::now(), n)
    }

    pub fn admit_at(&mut self, now: Instant, n: u32) -> bool {
        self.expire(now);

        if self.count().saturating_add(n) > self.max_per_second {
            return false;
        }
        self.admitted.extend(std::iter::repeat_n(now, n as usize));
        true
    }

    /// Time until `n` more requests could be admitted
    pub fn time_until_available(&self, now: Instant, n: u32) -> Duration {
        let count = self.live(now).count() as u32;
        let excess = (count + n).saturating_sub(self.max_per_second);
        if excess == 0 {
            return Duration::ZERO;
        }

        // The `excess`-th oldest live admission has to age out first
        self.live(now)
            .nth(excess as usize - 1)
            .map(|t| WINDOW.saturating_sub(now.saturating_duration_since(*t)))
            .unwrap_or(WINDOW)
    }

    /// Requests admitted within the last second, as of the last admission
    pub fn count(&self) -> u32 {
        self.admitted.len() as u32
    }

    /// Start of the current window: the oldest admission still counted
    pub fn window_start(&self) -> Option<Instant> {
        self.admitted.front().copied()
    }

    pub fn max_per_second(&self) -> u32 {
        self.max_per_second
    }

    fn live(&self, now: Instant) -> impl Iterator<Item = &Instant> {
        self.admitted
            .iter()
            .filter(move |t| now.saturating_duration_since(**t) < WINDOW)
    }

    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= WINDOW {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_cap() {
        let start = Instant::now();
        let mut window = RateWindow::new(3);

        assert!(window.admit_at(start, 1));
        assert!(window.admit_at(start, 1));
        assert!(window.admit_at(start, 1));
        assert!(!window.admit_at(start, 1));
        assert_eq!(window.count(), 3);
    }

    #[test]
    fn test_resets_after_one_second() {
        let start = Instant::now();
        let mut window = RateWindow::new(2);

        assert!(window.admit_at(start, 2));
        assert!(!window.admit_at(start + Duration::from_millis(999), 1));

        // Exactly one second later the earlier admissions age out
        assert!(window.admit_at(start + Duration::from_secs(1), 1));
        assert_eq!(window.count(), 1);
        assert_eq!(window.window_start(), Some(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_admit_many_is_all_or_nothing() {
        let start = Instant::now();
        let mut window = RateWindow::new(5);

        assert!(window.admit_at(start, 3));
        assert!(!window.admit_at(start, 3));
        assert_eq!(window.count(), 3);
        assert!(window.admit_at(start, 2));
    }

    #[test]
    fn test_time_until_available() {
        let start = Instant::now();
        let mut window = RateWindow::new(2);
        window.admit_at(start, 1);
        window.admit_at(start + Duration::from_millis(400), 1);

        let now = start + Duration::from_millis(500);
        assert_eq!(window.time_until_available(now, 1), Duration::from_millis(500));
        assert_eq!(window.time_until_available(now, 2), Duration::from_millis(900));
        assert_eq!(
            window.time_until_available(start + Duration::from_secs(2), 2),
            Duration::ZERO
        );
    }

    #[test]
    fn test_boundary_burst_is_refused() {
        // A fixed window would admit 2 at 0.9s and 2 more at 1.0s
        let start = Instant::now();
        let mut window = RateWindow::new(2);

        assert!(window.admit_at(start + Duration::from_millis(900), 2));
        assert!(!window.admit_at(start + Duration::from_millis(1000), 1));
        assert!(window.admit_at(start + Duration::from_millis(1900), 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_cap_in_any_rolling_window() {
        let mut window = RateWindow::new(4);
        let mut admitted: Vec<Instant> = Vec::new();

        // Offer a request every 70ms for seven simulated seconds
        for _ in 0..100 {
            if window.admit() {
                admitted.push(Instant::now());
            }
            tokio::time::advance(Duration::from_millis(70)).await;
        }

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < Duration::from_secs(1))
                .count();
            assert!(in_window <= 4, "window starting at #{i} admitted {in_window}");
        }
        assert!(admitted.len() >= 24);
    }
}
