//! Regression metrics

use crate::errors::{Result, TrainerError};

/// Root mean squared error.
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(TrainerError::CrossValidation(format!(
            "rmse over {} targets and {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(TrainerError::CrossValidation(
            "rmse over an empty vector".to_string(),
        ));
    }

    let sum: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    Ok((sum / y_true.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmse() -> Result<()> {
        assert_eq!(rmse(&[1.0, 2.0], &[1.0, 2.0])?, 0.0);
        assert!((rmse(&[0.0, 0.0], &[3.0, 4.0])? - 12.5f64.sqrt()).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_rmse_rejects_bad_input() {
        assert!(rmse(&[], &[]).is_err());
        assert!(rmse(&[1.0], &[1.0, 2.0]).is_err());
    }
}
