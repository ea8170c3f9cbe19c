use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Countdown of finished client supervisors.
///
/// Each producer signals once; observers read the count without consuming
/// it. The count never exceeds `total`.
#[derive(Debug)]
pub struct CompletionLatch {
    total: usize,
    done: AtomicUsize,
    closed: AtomicBool,
}

impl CompletionLatch {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Record one finished producer. Returns the count after signalling.
    pub fn signal(&self) -> usize {
        let total = self.total;
        match self
            .done
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < total).then_some(n + 1)
            }) {
            Ok(prev) => prev + 1,
            Err(full) => full,
        }
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.completed() >= self.total
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_to_total() {
        let latch = CompletionLatch::new(2);
        assert!(!latch.is_complete());
        assert_eq!(latch.signal(), 1);
        assert!(!latch.is_complete());
        assert_eq!(latch.signal(), 2);
        assert!(latch.is_complete());
        assert_eq!(latch.completed(), 2);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let latch = CompletionLatch::new(2);
        for _ in 0..5 {
            latch.signal();
        }
        assert_eq!(latch.completed(), 2);
    }

    #[test]
    fn test_concurrent_signals() {
        let latch = Arc::new(CompletionLatch::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = latch.clone();
                std::thread::spawn(move || latch.signal())
            })
            .collect();
        let mut seen: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();

        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
        assert!(latch.is_complete());
    }

    #[test]
    fn test_close() {
        let latch = CompletionLatch::new(1);
        assert!(!latch.is_closed());
        latch.close();
        assert!(latch.is_closed());
    }
}
