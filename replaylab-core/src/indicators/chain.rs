//! Indicator composition: `Chain<A, B>` feeds `A`'s reading into `B`.

use super::Indicator;
use crate::domain::Bar;

/// `B` applied to the output of `A`. Nothing reaches `B` until `A` is ready.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    inner: A,
    outer: B,
}

impl<A: Indicator, B: Indicator> Chain<A, B> {
    pub fn new(inner: A, outer: B) -> Self {
        Self { inner, outer }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn forward(&mut self) {
        let x = self.inner.value();
        if !x.is_nan() {
            self.outer.apply(x);
        }
    }
}

impl<A: Indicator, B: Indicator> Indicator for Chain<A, B> {
    fn update(&mut self, bar: &Bar) {
        self.inner.update(bar);
        self.forward();
    }

    fn apply(&mut self, x: f64) {
        self.inner.apply(x);
        self.forward();
    }

    fn value(&self) -> f64 {
        self.outer.value()
    }
}
