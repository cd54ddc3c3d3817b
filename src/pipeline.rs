//! Monadic pipeline composition with cooperative cancellation.
//!
//! Rust has no ambient `context.Context`; cancellation is threaded
//! explicitly as a [`CancellationToken`] argument to every stage, polled at
//! every suspension point, mirroring how the core's own transaction engine
//! threads an `Arc<AtomicBool>` through long-running operations.

use crate::error::{Error, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Called at every suspension point; returns `ExecutionCancelled` once
    /// cancellation has been requested.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::ExecutionCancelled { operation: stage.to_string() });
        }
        Ok(())
    }
}

type StageFn<A, B> = Box<dyn Fn(&CancellationToken, A) -> Result<B> + Send + Sync>;

/// A context-aware function `(CancellationToken, A) -> Result<B>`.
pub struct Pipeline<A, B> {
    label: String,
    f: StageFn<A, B>,
}

impl<A, B> Pipeline<A, B>
where
    A: 'static,
    B: 'static,
{
    pub fn new(label: impl Into<String>, f: impl Fn(&CancellationToken, A) -> Result<B> + Send + Sync + 'static) -> Self {
        Self { label: label.into(), f: Box::new(f) }
    }

    pub fn run(&self, token: &CancellationToken, input: A) -> Result<B> {
        token.check(&self.label)?;
        (self.f)(token, input)
    }

    /// `compose(p1: A->B, p2: B->C) -> A->C`. Short-circuits on error,
    /// checks cancellation between stages.
    pub fn compose<C>(self, next: Pipeline<B, C>) -> Pipeline<A, C>
    where
        C: 'static,
    {
        let label = format!("{} -> {}", self.label, next.label);
        Pipeline::new(label, move |token, input| {
            let out = self.run(token, input)?;
            token.check(&next.label)?;
            next.run(token, out)
        })
    }

    pub fn map<C>(self, f: impl Fn(B) -> C + Send + Sync + 'static) -> Pipeline<A, C>
    where
        C: 'static,
    {
        let label = self.label.clone();
        Pipeline::new(label, move |token, input| self.run(token, input).map(&f))
    }

    pub fn flat_map<C>(self, f: impl Fn(B) -> Result<C> + Send + Sync + 'static) -> Pipeline<A, C>
    where
        C: 'static,
    {
        let label = self.label.clone();
        Pipeline::new(label, move |token, input| self.run(token, input).and_then(&f))
    }

    /// Drops values failing `pred`, materializing a typed error via `err`.
    pub fn filter(
        self,
        pred: impl Fn(&B) -> bool + Send + Sync + 'static,
        err: impl Fn(&B) -> Error + Send + Sync + 'static,
    ) -> Pipeline<A, B> {
        let label = self.label.clone();
        Pipeline::new(label, move |token, input| {
            let out = self.run(token, input)?;
            if pred(&out) {
                Ok(out)
            } else {
                Err(err(&out))
            }
        })
    }
}

/// `parallel([A->B]) -> A->[B]`: fan the same input out across every
/// stage concurrently; the first error fails the whole call.
pub fn parallel<A, B>(stages: Vec<Pipeline<A, B>>) -> Pipeline<A, Vec<B>>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
{
    Pipeline::new("parallel", move |token, input: A| {
        let results: Vec<Result<B>> = stages
            .par_iter()
            .map(|stage| stage.run(token, input.clone()))
            .collect();
        results.into_iter().collect::<Result<Vec<B>>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_short_circuits_on_first_error() {
        let first: Pipeline<i32, i32> = Pipeline::new("first", |_, x| Ok(x + 1));
        let second: Pipeline<i32, i32> = Pipeline::new("second", |_, _| {
            Err(Error::NotImplemented("boom".to_string()))
        });
        let composed = first.compose(second);
        let token = CancellationToken::new();
        assert!(composed.run(&token, 1).is_err());
    }

    #[test]
    fn cancellation_is_observed_before_stage_runs() {
        let token = CancellationToken::new();
        token.cancel();
        let stage: Pipeline<i32, i32> = Pipeline::new("stage", |_, x| Ok(x));
        let err = stage.run(&token, 1).unwrap_err();
        assert!(matches!(err, Error::ExecutionCancelled { .. }));
    }

    #[test]
    fn parallel_collects_all_results_in_stage_order() {
        let stages = vec![
            Pipeline::new("a", |_, x: i32| Ok(x + 1)),
            Pipeline::new("b", |_, x: i32| Ok(x + 2)),
        ];
        let p = parallel(stages);
        let token = CancellationToken::new();
        let results = p.run(&token, 10).unwrap();
        assert_eq!(results, vec![11, 12]);
    }
}
