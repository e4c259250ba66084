use super::*;
use crate::evaluator::{Evaluator, PopulationView};

/// Takes samples of the requested symbols at fixed times and hands them to
/// a sink.
pub(crate) struct Sampler<'s> {
    times: Vec<f64>,
    slots: Vec<Slot>,
    next: usize,
    row: Vec<f64>,
    sink: &'s mut dyn SampleSink,
}

impl<'s> Sampler<'s> {
    pub fn new(
        model: &Model,
        request: &SimulationRequest,
        sink: &'s mut dyn SampleSink,
    ) -> Result<Self> {
        let slots = request.resolve(model)?;
        Ok(Sampler {
            times: request.sample_times(),
            row: vec![0.; slots.len()],
            slots,
            next: 0,
            sink,
        })
    }

    pub fn next_time(&self) -> Option<f64> {
        self.times.get(self.next).copied()
    }

    /// The first pending sample time strictly after `time`.
    pub fn next_after(&self, time: f64) -> Option<f64> {
        self.times[self.next..].iter().copied().find(|&t| t > time)
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.times.len()
    }

    /// Samples `state` at every pending sample time strictly before `time`.
    /// The evaluator's clock is moved to each sample time in turn.
    pub fn record_before<S>(
        &mut self,
        time: f64,
        evaluator: &mut Evaluator,
        state: &S,
    ) -> Result<()>
    where
        S: PopulationView + ?Sized,
    {
        while self.next_time().is_some_and(|t| t < time) {
            self.record(evaluator, state)?;
        }
        Ok(())
    }

    /// Like `record_before`, but also samples at `time` itself.
    pub fn record_through<S>(
        &mut self,
        time: f64,
        evaluator: &mut Evaluator,
        state: &S,
    ) -> Result<()>
    where
        S: PopulationView + ?Sized,
    {
        while self.next_time().is_some_and(|t| t <= time) {
            self.record(evaluator, state)?;
        }
        Ok(())
    }

    /// Samples `state` at every remaining time.
    pub fn fill_remaining<S>(&mut self, evaluator: &mut Evaluator, state: &S) -> Result<()>
    where
        S: PopulationView + ?Sized,
    {
        while !self.is_done() {
            self.record(evaluator, state)?;
        }
        Ok(())
    }

    fn record<S>(&mut self, evaluator: &mut Evaluator, state: &S) -> Result<()>
    where
        S: PopulationView + ?Sized,
    {
        let time = self.times[self.next];
        evaluator.set_time(time);
        for (value, &slot) in self.row.iter_mut().zip(self.slots.iter()) {
            *value = evaluator.slot_value(slot, &[], state)?;
        }
        self.sink.record(time, &self.row);
        self.next += 1;
        Ok(())
    }
}
