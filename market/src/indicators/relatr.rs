use tracing::warn;

use super::round_to;
use crate::error::ComputationError;

/// Distance of close from VWAP in units of daily ATR, rounded to 2 decimals.
/// Positive when price trades below VWAP.
pub fn relatr(vwap: f64, close: f64, atr: Option<f64>) -> Result<f64, ComputationError> {
    let atr = atr.ok_or(ComputationError::MissingAtr)?;
    if !atr.is_finite() {
        return Err(ComputationError::NonFinite("atr"));
    }
    if atr == 0.0 {
        return Err(ComputationError::ZeroAtr);
    }
    if !vwap.is_finite() || !close.is_finite() {
        return Err(ComputationError::NonFinite("vwap/close"));
    }
    Ok(round_to((vwap - close) / atr, 2))
}

/// [`relatr`] with the error recovered as a null value.
pub fn relatr_or_none(symbol: &str, vwap: f64, close: f64, atr: Option<f64>) -> Option<f64> {
    match relatr(vwap, close, atr) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%symbol, error = %e, "relatr unavailable; storing null");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn distance_in_atr_units() {
        assert_eq!(relatr(101.0, 99.0, Some(1.6)), Ok(1.25));
        assert_eq!(relatr(99.0, 101.0, Some(2.0)), Ok(-1.0));
    }

    #[test]
    fn missing_or_zero_atr_is_an_error() {
        assert_eq!(relatr(1.0, 1.0, None), Err(ComputationError::MissingAtr));
        assert_eq!(relatr(1.0, 1.0, Some(0.0)), Err(ComputationError::ZeroAtr));
    }

    #[test]
    #[traced_test]
    fn unavailable_relatr_is_logged_and_nulled() {
        assert_eq!(relatr_or_none("ABC", 1.0, 1.0, Some(0.0)), None);
        assert!(logs_contain("relatr unavailable; storing null"));
        assert!(logs_contain("ATR snapshot is zero"));
    }
}
