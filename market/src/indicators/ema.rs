use super::{finite_or_zero, round_to};

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded by
/// the first observation: `ema[0] = x[0]`, `ema[t] = ema[t-1] + alpha * (x[t] - ema[t-1])`.
///
/// The running value is kept unrounded; callers round what they store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period.max(1) as f64 + 1.0),
            value: None,
        }
    }

    /// Feeds one observation and returns the updated (unrounded) average.
    pub fn update(&mut self, x: f64) -> f64 {
        let x = finite_or_zero(x);
        let next = match self.value {
            None => x,
            // Written as a step towards x so a constant input is a fixed point.
            Some(prev) => prev + self.alpha * (x - prev),
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// EMA of `values` rounded to 2 decimals, one output per input.
pub fn ema_series<I>(values: I, period: usize) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut ema = Ema::new(period);
    values
        .into_iter()
        .map(|v| round_to(ema.update(v), 2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_recurrence_with_rounding() {
        // alpha = 0.5; 12.125 rounds to even.
        let out = ema_series([10.0, 11.0, 12.0, 13.0], 3);
        assert_eq!(out, vec![10.0, 10.5, 11.25, 12.12]);
    }

    #[test]
    fn constant_series_is_a_fixed_point() {
        let out = ema_series(std::iter::repeat_n(42.37, 200), 9);
        assert!(out.iter().all(|v| *v == 42.37));

        let mut ema = Ema::new(9);
        for _ in 0..1_000 {
            ema.update(3.3);
        }
        assert_eq!(ema.value(), Some(3.3));
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(ema_series(Vec::<f64>::new(), 9).is_empty());
        assert_eq!(Ema::new(9).value(), None);
    }
}
