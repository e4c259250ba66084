use super::*;

/// Stops a run once it has taken `threshold` events or integration steps.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct EventCount {
    pub threshold: u64,
    count: u64,
}

impl EventCount {
    pub fn new(threshold: u64) -> Self {
        EventCount {
            threshold,
            count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl EndingCriterion for EventCount {
    fn should_end(&self) -> Option<Termination> {
        (self.count >= self.threshold).then_some(Termination::BudgetExhausted)
    }

    fn initialize(&mut self, _start_time: f64) {
        self.count = 0;
    }

    fn update(&mut self, _time: f64) {
        self.count += 1;
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn ends_at_threshold() {
        let mut criterion = EventCount::new(2);
        criterion.initialize(0.);
        assert_eq!(criterion.should_end(), None);
        criterion.update(0.5);
        assert_eq!(criterion.should_end(), None);
        criterion.update(0.7);
        assert_eq!(criterion.should_end(), Some(Termination::BudgetExhausted));
        assert_eq!(criterion.count(), 2);

        criterion.initialize(0.);
        assert_eq!(criterion.should_end(), None);
    }
}
