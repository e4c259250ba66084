use super::*;

/// A flag that asks running simulations to stop. Clones share the flag, so
/// one token can be handed to a run and cancelled from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Stops a run once its token has been cancelled.
#[derive(Debug, Clone)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    pub fn new(token: CancellationToken) -> Self {
        Cancellation { token }
    }
}

impl EndingCriterion for Cancellation {
    fn should_end(&self) -> Option<Termination> {
        self.token.is_cancelled().then_some(Termination::Cancelled)
    }

    fn initialize(&mut self, _start_time: f64) {}

    fn update(&mut self, _time: f64) {}
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let criterion = Cancellation::new(token.clone());
        assert_eq!(criterion.should_end(), None);
        token.cancel();
        assert_eq!(criterion.should_end(), Some(Termination::Cancelled));
    }
}
