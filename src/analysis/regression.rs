//! Ordinary least squares over index-ordered series

/// Relative variance below which a series is treated as constant
const DEGENERATE_VARIANCE: f64 = 1e-12;

/// A fitted line `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Fit a line against `(index, value)` pairs.
///
/// A singular design (fewer than two points) yields a flat line through the
/// mean instead of an error.
pub fn least_squares(values: &[f64]) -> LinearFit {
    let Some(y_mean) = mean(values) else {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
        };
    };

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;

    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, y)| {
            let dx = i as f64 - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });

    if sxx == 0.0 {
        return LinearFit {
            slope: 0.0,
            intercept: y_mean,
        };
    }

    let slope = sxy / sxx;
    LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
    }
}

/// Coefficient of determination between two equally sized series, computed as
/// the squared correlation.
///
/// Returns `None` when it is undefined: mismatched or too short series, or
/// zero variance in either series.
pub fn r_squared(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    if predicted.len() != actual.len() || predicted.len() < 2 {
        return None;
    }

    let p_mean = mean(predicted)?;
    let a_mean = mean(actual)?;

    let (cov, p_var, a_var) = predicted.iter().zip(actual).fold(
        (0.0, 0.0, 0.0),
        |(cov, p_var, a_var), (p, a)| {
            let dp = p - p_mean;
            let da = a - a_mean;
            (cov + dp * da, p_var + dp * dp, a_var + da * da)
        },
    );

    let n = predicted.len() as f64;
    if is_degenerate(p_var / n, p_mean) || is_degenerate(a_var / n, a_mean) {
        return None;
    }

    let correlation = cov / (p_var * a_var).sqrt();
    Some((correlation * correlation).clamp(0.0, 1.0))
}

fn is_degenerate(variance: f64, mean: f64) -> bool {
    variance <= DEGENERATE_VARIANCE * mean.powi(2).max(1.0)
}
