//! Request ids for twin requests.

/// Monotonic request id source.
///
/// Ids are decimal strings counting up from `0`. The counter wraps at
/// `u32::MAX` and is never reset within a session.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: u32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> String {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_zero() {
        let mut ids = RequestIdGenerator::new();
        assert_eq!(ids.next_id(), "0");
        assert_eq!(ids.next_id(), "1");
        assert_eq!(ids.next_id(), "2");
    }

    #[test]
    fn test_wraps_at_max() {
        let mut ids = RequestIdGenerator { next: u32::MAX };
        assert_eq!(ids.next_id(), u32::MAX.to_string());
        assert_eq!(ids.next_id(), "0");
    }
}
