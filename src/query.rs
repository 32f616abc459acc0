//! Request state for asynchronous loads.
//!
//! Every load against the database goes through a [`QuerySlot`]: starting a
//! load hands out a [`RequestToken`], and only the holder of the most
//! recent token may publish a result. A load that was superseded while in
//! flight is dropped instead of overwriting newer state.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState<T> {
    Idle,
    Loading,
    Success(T),
    Error(String),
}

impl<T> QueryState<T> {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

#[derive(Debug, Clone)]
pub struct QuerySlot<T> {
    generation: u64,
    state: QueryState<T>,
    last_success: Option<T>,
}

impl<T> Default for QuerySlot<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            state: QueryState::Idle,
            last_success: None,
        }
    }
}

impl<T: Clone> QuerySlot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the slot loading and supersedes any load already in flight.
    pub fn begin(&mut self) -> RequestToken {
        self.generation += 1;
        self.state = QueryState::Loading;
        RequestToken(self.generation)
    }

    /// Publishes the outcome of the load identified by `token`. Returns
    /// `false` and leaves the slot untouched when the token is stale.
    pub fn complete(&mut self, token: RequestToken, result: Result<T, String>) -> bool {
        if token.0 != self.generation {
            return false;
        }
        self.state = match result {
            Ok(value) => {
                self.last_success = Some(value.clone());
                QueryState::Success(value)
            }
            Err(message) => QueryState::Error(message),
        };
        true
    }

    /// Drops back to idle; a load still in flight becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = QueryState::Idle;
    }

    #[must_use]
    pub fn state(&self) -> &QueryState<T> {
        &self.state
    }

    /// Most recent successful value, kept across later failures.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Success(value) => Some(value),
            _ => self.last_success.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_with_current_token() {
        let mut slot = QuerySlot::new();
        let token = slot.begin();
        assert!(slot.state().is_loading());

        assert!(slot.complete(token, Ok(3)));
        assert_eq!(slot.state(), &QueryState::Success(3));
        assert_eq!(slot.data(), Some(&3));
    }

    #[test]
    fn superseded_load_is_discarded() {
        let mut slot = QuerySlot::new();
        let first = slot.begin();
        let second = slot.begin();

        assert!(slot.complete(second, Ok("fresh")));
        assert!(!slot.complete(first, Ok("stale")));
        assert_eq!(slot.state(), &QueryState::Success("fresh"));
    }

    #[test]
    fn error_keeps_last_good_value() {
        let mut slot = QuerySlot::new();
        let token = slot.begin();
        slot.complete(token, Ok(10));

        let token = slot.begin();
        slot.complete(token, Err("connection reset".to_string()));

        assert_eq!(slot.state(), &QueryState::Error("connection reset".into()));
        assert_eq!(slot.data(), Some(&10));
    }

    #[test]
    fn reset_invalidates_in_flight_load() {
        let mut slot: QuerySlot<u8> = QuerySlot::new();
        let token = slot.begin();
        slot.reset();

        assert!(!slot.complete(token, Ok(1)));
        assert_eq!(slot.state(), &QueryState::Idle);
    }
}
