use crate::model::RecordId;

/// Hands out challenge ids. Seeded at load time from the highest stored id.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    // u64 so that observing RecordId::MAX does not overflow the watermark
    next: u64,
}

impl IdGenerator {
    pub fn new(floor: RecordId) -> Self {
        Self { next: floor as u64 }
    }

    /// The id the next call to [`IdGenerator::next`] returns.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Moves the watermark past a persisted id.
    pub fn observe(&mut self, id: RecordId) {
        self.next = self.next.max(id as u64 + 1);
    }

    /// Panics once the id space is exhausted; reusing an id would corrupt the index.
    pub fn next(&mut self) -> RecordId {
        let id = RecordId::try_from(self.next)
            .unwrap_or_else(|_| panic!("challenge id space exhausted (watermark {})", self.next));
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_floor() {
        let mut ids = IdGenerator::new(1);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }

    #[test]
    fn observe_only_moves_forward() {
        let mut ids = IdGenerator::new(1);
        ids.observe(7);
        ids.observe(3);
        assert_eq!(ids.peek(), 8);
        assert_eq!(ids.next(), 8);
    }

    #[test]
    fn observe_max_id_does_not_wrap() {
        let mut ids = IdGenerator::new(1);
        ids.observe(RecordId::MAX);
        assert_eq!(ids.peek(), RecordId::MAX as u64 + 1);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhausted_id_space_is_fatal() {
        let mut ids = IdGenerator::new(1);
        ids.observe(RecordId::MAX);
        ids.next();
    }
}
