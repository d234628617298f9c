//! Sequential (Type I) effect sums of squares for two-way designs.
//!
//! `SS_A` uses the count-weighted marginal means of factor A. `SS_B` is the
//! extra sum of squares of the additive model `A + B` over `A` alone, and
//! `SS_AB` is the weighted squared distance between the cell means and the
//! additive fit:
//!
//! ```text
//! SS_A  = Σᵢ nᵢ·(ȳᵢ· - ȳ)²
//! SS_B  = Σᵢⱼ nᵢⱼ(αᵢ + βⱼ)² - SS_A
//! SS_AB = Σᵢⱼ nᵢⱼ(ȳᵢⱼ - ȳ - αᵢ - βⱼ)²
//! ```
//!
//! The additive effects `α`, `β` are the weighted least-squares fit to the cell
//! means, found by alternating weighted projections onto the row and column
//! effects. In balanced and proportional designs the first sweep is exact and the
//! formulas above reduce to the closed forms on marginal means.

use ndarray::{Array1, Array2, Axis};

use crate::design::Design;
use crate::error::{AnovaError, Result};

const MAX_SWEEPS: usize = 10_000;
const CONVERGENCE_TOLERANCE: f64 = 1e-13;

/// Effect components of a two-way sequential decomposition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequentialEffects {
    pub factor_a: f64,
    pub factor_b: f64,
    pub interaction: f64,
}

/// Additive row and column effects, relative to the grand mean.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveFit {
    pub row_effects: Array1<f64>,
    pub column_effects: Array1<f64>,
    pub sweeps: usize,
}

pub fn sequential(design: &Design) -> Result<SequentialEffects> {
    let (means, sizes) = design
        .cell_matrices()
        .ok_or_else(|| AnovaError::invalid_design("expected a two-way design"))?;
    let grand_mean = design.centred_grand_mean();
    let centered = means.mapv(|m| m - grand_mean);

    let factor_a: f64 = design
        .centred_marginals(0)
        .iter()
        .map(|m| m.count as f64 * (m.mean - grand_mean).powi(2))
        .sum();

    let fit = fit_additive(&centered, &sizes);
    let (a, b) = centered.dim();

    let mut additive = 0.0;
    let mut interaction = 0.0;
    for i in 0..a {
        for j in 0..b {
            let fitted = fit.row_effects[i] + fit.column_effects[j];
            additive += sizes[[i, j]] * fitted * fitted;
            interaction += sizes[[i, j]] * (centered[[i, j]] - fitted).powi(2);
        }
    }

    Ok(SequentialEffects {
        factor_a,
        factor_b: (additive - factor_a).max(0.0),
        interaction,
    })
}

/// Weighted least-squares fit of `α_i + β_j` to centred cell means.
///
/// Each sweep sets every `α_i` to the weighted mean of `ȳᵢⱼ - ȳ - βⱼ` over its row,
/// then every `β_j` to the weighted mean of `ȳᵢⱼ - ȳ - αᵢ` over its column. Cells
/// must all be non-empty, which a fully crossed design guarantees.
pub fn fit_additive(centered: &Array2<f64>, sizes: &Array2<f64>) -> AdditiveFit {
    let (a, b) = centered.dim();
    let row_totals = sizes.sum_axis(Axis(1));
    let column_totals = sizes.sum_axis(Axis(0));
    let scale = centered
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    let mut row_effects = Array1::<f64>::zeros(a);
    let mut column_effects = Array1::<f64>::zeros(b);
    let mut sweeps = 0;

    while sweeps < MAX_SWEEPS {
        sweeps += 1;
        let mut change = 0.0_f64;

        for i in 0..a {
            let weighted: f64 = (0..b)
                .map(|j| sizes[[i, j]] * (centered[[i, j]] - column_effects[j]))
                .sum();
            let updated = weighted / row_totals[i];
            change = change.max((updated - row_effects[i]).abs());
            row_effects[i] = updated;
        }
        for j in 0..b {
            let weighted: f64 = (0..a)
                .map(|i| sizes[[i, j]] * (centered[[i, j]] - row_effects[i]))
                .sum();
            let updated = weighted / column_totals[j];
            change = change.max((updated - column_effects[j]).abs());
            column_effects[j] = updated;
        }

        // the first sweep moves away from zero even when it is already exact
        if sweeps > 1 && change <= CONVERGENCE_TOLERANCE * scale {
            break;
        }
    }

    if sweeps == MAX_SWEEPS {
        tracing::warn!(sweeps, "additive two-way fit did not converge");
    } else {
        tracing::trace!(sweeps, "additive two-way fit converged");
    }

    AdditiveFit {
        row_effects,
        column_effects,
        sweeps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::build_two_way;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_balanced_fit_is_marginal_deviation() {
        // cell means 2 5 / 6 9 around grand mean 5.5
        let centered = array![[-3.5, -0.5], [0.5, 3.5]];
        let sizes = array![[2.0, 2.0], [2.0, 2.0]];
        let fit = fit_additive(&centered, &sizes);

        assert_abs_diff_eq!(fit.row_effects[0], -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.row_effects[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.column_effects[0], -1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.column_effects[1], 1.5, epsilon = 1e-12);
        assert_eq!(fit.sweeps, 2);
    }

    #[test]
    fn test_unbalanced_additive_data_has_no_interaction() {
        // cell means follow 10 + row + column exactly, sizes differ
        let design = build_two_way(vec![
            (("a1", "b1"), vec![11.0]),
            (("a1", "b2"), vec![13.0, 13.0, 13.0]),
            (("a1", "b3"), vec![16.0, 16.0]),
            (("a2", "b1"), vec![15.0, 15.0, 15.0, 15.0]),
            (("a2", "b2"), vec![17.0]),
            (("a2", "b3"), vec![20.0, 20.0]),
        ])
        .unwrap();
        let effects = sequential(&design).unwrap();

        assert_abs_diff_eq!(effects.interaction, 0.0, epsilon = 1e-9);
        assert!(effects.factor_a > 0.0);
        assert!(effects.factor_b > 0.0);
    }

    #[test]
    fn test_additive_fit_is_order_invariant() {
        let forward = build_two_way(vec![
            (("a1", "b1"), vec![3.0, 4.0]),
            (("a1", "b2"), vec![7.0]),
            (("a2", "b1"), vec![2.0, 6.0, 5.0]),
            (("a2", "b2"), vec![9.0, 12.0]),
        ])
        .unwrap();
        let swapped = build_two_way(vec![
            (("b1", "a1"), vec![3.0, 4.0]),
            (("b2", "a1"), vec![7.0]),
            (("b1", "a2"), vec![2.0, 6.0, 5.0]),
            (("b2", "a2"), vec![9.0, 12.0]),
        ])
        .unwrap();

        let f = sequential(&forward).unwrap();
        let s = sequential(&swapped).unwrap();

        // both orders explain the same additive model and leave the same interaction
        assert_abs_diff_eq!(f.factor_a + f.factor_b, s.factor_a + s.factor_b, epsilon = 1e-9);
        assert_abs_diff_eq!(f.interaction, s.interaction, epsilon = 1e-9);
    }
}
