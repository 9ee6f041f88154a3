//! Recently seen message IDs.
//!
//! Flooded packets reach a node over several paths. The window remembers the
//! last few message IDs, most recent first, so repeats can be dropped before
//! they cost a buffer.

/// Default number of remembered IDs
pub const REPLAY_WINDOW_LEN: usize = 10;

/// Fixed-size most-recent-first window of message IDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayWindow<const N: usize = REPLAY_WINDOW_LEN> {
    ids: [u16; N],
    len: usize,
}

impl<const N: usize> Default for ReplayWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReplayWindow<N> {
    /// Create an empty window
    pub const fn new() -> Self {
        Self { ids: [0; N], len: 0 }
    }

    /// Whether `id` is among the remembered IDs
    pub fn contains(&self, id: u16) -> bool {
        self.ids[..self.len].contains(&id)
    }

    /// Remember `id` as the most recent, evicting the oldest when full
    pub fn record(&mut self, id: u16) {
        if N == 0 {
            return;
        }
        let keep = self.len.min(N - 1);
        self.ids.copy_within(0..keep, 1);
        self.ids[0] = id;
        self.len = keep + 1;
    }

    /// Remembered IDs, most recent first
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ids[..self.len].iter().copied()
    }

    /// Number of remembered IDs
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window() {
        let window: ReplayWindow = ReplayWindow::new();
        assert!(window.is_empty());
        assert!(!window.contains(0));
    }

    #[test]
    fn test_most_recent_first() {
        let mut window: ReplayWindow<3> = ReplayWindow::new();
        window.record(1);
        window.record(2);
        window.record(3);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![3, 2, 1]);

        window.record(4);
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert!(!window.contains(1));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_default_window_evicts_after_ten() {
        let mut window: ReplayWindow = ReplayWindow::default();
        for id in 0..REPLAY_WINDOW_LEN as u16 {
            window.record(id);
        }
        assert!(window.contains(0));

        window.record(100);
        assert!(!window.contains(0));
        assert!(window.contains(1));
        assert_eq!(window.len(), REPLAY_WINDOW_LEN);
        assert!(window.contains(100));
    }
}
