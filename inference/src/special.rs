use ndarray::Array2;
use statrs::function::gamma::digamma;

/// `E[log x]` for `x ~ Dirichlet(alpha)`.
pub(crate) fn dirichlet_expectation(alpha: &[f64]) -> Vec<f64> {
    let total = digamma(alpha.iter().sum());
    alpha.iter().map(|&a| digamma(a) - total).collect()
}

/// `log(sum(exp(values)))` without overflowing.
pub(crate) fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }

    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Turns every row of unnormalized log weights into probabilities.
pub(crate) fn log_normalize_rows(m: &mut Array2<f64>) {
    for mut row in m.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let norm = max + row.mapv(|v| (v - max).exp()).sum().ln();
        row.mapv_inplace(|v| (v - norm).exp());
    }
}

/// `E[log pi]` of a truncated stick breaking process with `Beta(a_i, b_i)` breaks.
///
/// Returns `a.len() + 1` values, the last stick takes the remaining mass.
pub(crate) fn expect_log_sticks(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());

    let mut sticks = vec![0.; a.len() + 1];
    let mut rest = 0.;

    for (i, (&a, &b)) in a.iter().zip(b).enumerate() {
        let total = digamma(a + b);
        sticks[i] = digamma(a) - total + rest;
        rest += digamma(b) - total;
    }

    sticks[a.len()] = rest;
    sticks
}

/// The expected weights of a truncated stick breaking process with `Beta(a_i, b_i)` breaks.
pub(crate) fn expect_sticks(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut weights = Vec::with_capacity(a.len() + 1);
    let mut left = 1.;

    for (&a, &b) in a.iter().zip(b) {
        let v = a / (a + b);
        weights.push(left * v);
        left *= 1. - v;
    }

    weights.push(left);
    weights
}

pub(crate) fn mean_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.;
    }

    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn symmetric_dirichlet_expectation() {
        let e = dirichlet_expectation(&[1., 1.]);
        // E[log x] for a uniform Beta is -1.
        assert!((e[0] + 1.).abs() < EPS);
        assert!((e[0] - e[1]).abs() < EPS);
    }

    #[test]
    fn log_normalize_sums_every_row_to_one() {
        let mut m = ndarray::array![[1000., 1000., 998.], [-5., 0., 1.]];
        log_normalize_rows(&mut m);
        for row in m.rows() {
            assert!((row.sum() - 1.).abs() < EPS);
        }
        assert!((m[[0, 0]] - m[[0, 1]]).abs() < EPS);
    }

    #[test]
    fn log_sum_exp_of_empty_is_negative_infinity() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn sticks_have_one_more_entry() {
        let e = expect_log_sticks(&[1., 1.], &[1., 1.]);
        assert_eq!(e.len(), 3);
        // The first break of a uniform stick has E[log v] = -1.
        assert!((e[0] + 1.).abs() < EPS);
    }

    #[test]
    fn expected_sticks_sum_to_one() {
        let w = expect_sticks(&[1., 2., 3.], &[4., 5., 6.]);
        assert_eq!(w.len(), 4);
        assert!((w.iter().sum::<f64>() - 1.).abs() < EPS);
    }
}
