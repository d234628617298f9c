//! F-statistic engine.
//!
//! Turns a [`SumOfSquares`] into mean squares, F-ratios and upper-tail p-values
//! against the residual mean square, and decides significance at the caller's
//! alpha. Each effect is compared against the same `MS_error`.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::decomposition::{Effect, RELATIVE_TOLERANCE, SumOfSquares};
use crate::design::{Design, DesignKind};
use crate::error::{AnovaError, Result, validate_alpha};

/// Test of one effect against the residual.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FTestResult {
    pub effect: Effect,
    /// Effect name built from the design's factor names.
    pub label: String,
    pub sum_of_squares: f64,
    pub degrees_of_freedom: usize,
    pub mean_square: f64,
    /// `+inf` when the residual mean square is zero and the effect is not.
    pub f_ratio: f64,
    /// `P(F(df_effect, df_error) >= f_ratio)`.
    pub p_value: f64,
    /// Upper `alpha` quantile of `F(df_effect, df_error)`.
    pub critical_value: f64,
    pub alpha: f64,
    /// `p_value < alpha`, equivalently `f_ratio > critical_value`.
    pub significant: bool,
    /// `SS_effect / SS_total`.
    pub eta_squared: f64,
    /// `SS_effect / (SS_effect + SS_error)`.
    pub partial_eta_squared: f64,
}

impl FTestResult {
    pub fn is_significant(&self) -> bool {
        self.significant
    }
}

/// Residual (error) row of an ANOVA table.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResidualTerm {
    pub sum_of_squares: f64,
    pub degrees_of_freedom: usize,
    pub mean_square: f64,
}

/// Total row of an ANOVA table.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TotalTerm {
    pub sum_of_squares: f64,
    pub degrees_of_freedom: usize,
}

/// Degrees of freedom of every source of variation in a design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegreesOfFreedom {
    pub effects: Vec<(Effect, usize)>,
    pub error: usize,
    pub total: usize,
}

impl DegreesOfFreedom {
    pub fn effect(&self, effect: Effect) -> Option<usize> {
        self.effects
            .iter()
            .find(|(e, _)| *e == effect)
            .map(|(_, df)| *df)
    }
}

/// Effect tests plus the residual and total rows they were computed from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FTable {
    pub effects: Vec<FTestResult>,
    pub residual: ResidualTerm,
    pub total: TotalTerm,
    pub sum_of_squares: SumOfSquares,
}

impl FTable {
    pub fn get(&self, effect: Effect) -> Option<&FTestResult> {
        self.effects.iter().find(|r| r.effect == effect)
    }

    pub fn significant_effects(&self) -> impl Iterator<Item = &FTestResult> {
        self.effects.iter().filter(|r| r.significant)
    }
}

/// Degrees of freedom of a design.
///
/// - one-way: `df_between = k - 1`, `df_within = N - k`
/// - two-way: `df_A = a - 1`, `df_B = b - 1`, `df_AB = (a-1)(b-1)`, `df_error = N - ab`
///
/// Fails with [`AnovaError::InsufficientDegreesOfFreedom`] when `df_error <= 0`.
pub fn degrees_of_freedom(design: &Design) -> Result<DegreesOfFreedom> {
    let n = design.num_observations();
    let cells = design.num_cells();
    if n <= cells {
        return Err(AnovaError::InsufficientDegreesOfFreedom {
            observations: n,
            cells,
            residual_df: n as i64 - cells as i64,
        });
    }

    let effects = match design.kind() {
        DesignKind::OneWay => vec![(Effect::Factor(0), cells - 1)],
        DesignKind::TwoWay => {
            let a = design.factors()[0].num_levels();
            let b = design.factors()[1].num_levels();
            vec![
                (Effect::Factor(0), a - 1),
                (Effect::Factor(1), b - 1),
                (Effect::Interaction, (a - 1) * (b - 1)),
            ]
        }
    };

    Ok(DegreesOfFreedom {
        effects,
        error: n - cells,
        total: n - 1,
    })
}

/// Compute the F-test of every effect of a decomposition.
///
/// Every effect is tested as `MS_effect / MS_error`. A zero residual mean square
/// yields `F = +inf`, `p = 0` and a significant verdict for every effect with a
/// non-zero sum of squares; an effect that also has no variation of its own
/// (`0 / 0`) gets `F = 0`, `p = 1`.
pub fn compute_f(ss: &SumOfSquares, design: &Design, alpha: f64) -> Result<FTable> {
    validate_alpha(alpha)?;
    let df = degrees_of_freedom(design)?;

    let ms_error = ss.error / df.error as f64;
    let zero_threshold = RELATIVE_TOLERANCE * ss.total;

    let mut effects = Vec::with_capacity(ss.effects.len());
    for component in &ss.effects {
        let df_effect = df.effect(component.effect).ok_or_else(|| {
            AnovaError::invalid_design(format!(
                "effect {:?} does not belong to this design",
                component.effect
            ))
        })?;
        let label = component.effect.label(design);
        let mean_square = component.value / df_effect as f64;

        let f_ratio = if ss.error > 0.0 {
            mean_square / ms_error
        } else if component.value <= zero_threshold {
            0.0
        } else {
            f64::INFINITY
        };

        let p_value = f_upper_tail(f_ratio, df_effect, df.error)?;
        let critical_value = f_critical_value(alpha, df_effect, df.error)?;
        let significant = p_value < alpha;
        check_agreement(&label, f_ratio, critical_value, p_value, significant)?;

        tracing::debug!(
            effect = %label,
            f_ratio,
            p_value,
            critical_value,
            significant,
            "F test"
        );

        effects.push(FTestResult {
            effect: component.effect,
            label,
            sum_of_squares: component.value,
            degrees_of_freedom: df_effect,
            mean_square,
            f_ratio,
            p_value,
            critical_value,
            alpha,
            significant,
            eta_squared: ratio_or_zero(component.value, ss.total),
            partial_eta_squared: ratio_or_zero(component.value, component.value + ss.error),
        });
    }

    Ok(FTable {
        effects,
        residual: ResidualTerm {
            sum_of_squares: ss.error,
            degrees_of_freedom: df.error,
            mean_square: ms_error,
        },
        total: TotalTerm {
            sum_of_squares: ss.total,
            degrees_of_freedom: df.total,
        },
        sum_of_squares: ss.clone(),
    })
}

/// Upper-tail probability `P(F(df1, df2) >= f)`.
pub fn f_upper_tail(f: f64, df1: usize, df2: usize) -> Result<f64> {
    let dist = fisher_snedecor(df1, df2)?;
    if f.is_nan() {
        return Err(AnovaError::distribution("F-ratio is NaN"));
    }
    if f == f64::INFINITY {
        return Ok(0.0);
    }
    if f <= 0.0 {
        return Ok(1.0);
    }
    Ok(dist.sf(f).clamp(0.0, 1.0))
}

/// Critical value `F*` with `P(F(df1, df2) >= F*) = alpha`.
///
/// Found by bracketing and bisection on the survival function, so it agrees with
/// [`f_upper_tail`] to floating-point precision.
pub fn f_critical_value(alpha: f64, df1: usize, df2: usize) -> Result<f64> {
    validate_alpha(alpha)?;
    let dist = fisher_snedecor(df1, df2)?;

    let mut low = 0.0_f64;
    let mut high = 1.0_f64;
    while dist.sf(high) > alpha {
        low = high;
        high *= 2.0;
        if !high.is_finite() {
            return Err(AnovaError::distribution(format!(
                "no finite critical value for alpha {alpha} with ({df1}, {df2}) df"
            )));
        }
    }

    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if dist.sf(mid) > alpha {
            low = mid;
        } else {
            high = mid;
        }
        if high - low <= f64::EPSILON * high {
            break;
        }
    }
    Ok(0.5 * (low + high))
}

fn fisher_snedecor(df1: usize, df2: usize) -> Result<FisherSnedecor> {
    if df1 == 0 || df2 == 0 {
        return Err(AnovaError::distribution(format!(
            "F distribution needs positive degrees of freedom, got ({df1}, {df2})"
        )));
    }
    FisherSnedecor::new(df1 as f64, df2 as f64).map_err(|e| AnovaError::distribution(e.to_string()))
}

/// The p-value verdict must match the critical-value verdict, except for ratios
/// sitting on the critical value within bisection precision.
fn check_agreement(
    label: &str,
    f_ratio: f64,
    critical_value: f64,
    p_value: f64,
    significant: bool,
) -> Result<()> {
    let by_critical = f_ratio > critical_value;
    let on_boundary = (f_ratio - critical_value).abs() <= 1e-9 * critical_value.max(1.0);
    if by_critical != significant && !on_boundary {
        return Err(AnovaError::SignificanceMismatch {
            effect: label.to_string(),
            f_ratio,
            critical_value,
            p_value,
        });
    }
    Ok(())
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::decompose;
    use crate::design::{build_one_way, build_two_way};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn scenario_one() -> Design {
        build_one_way(vec![
            ("G1", vec![2.0, 3.0, 4.0]),
            ("G2", vec![5.0, 6.0, 7.0]),
            ("G3", vec![8.0, 9.0, 10.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_one_way_hand_computed() {
        let design = scenario_one();
        let ss = decompose(&design).unwrap();
        let table = compute_f(&ss, &design, 0.05).unwrap();
        let between = table.get(Effect::Factor(0)).unwrap();

        assert_eq!(between.degrees_of_freedom, 2);
        assert_eq!(table.residual.degrees_of_freedom, 6);
        assert_eq!(table.total.degrees_of_freedom, 8);
        assert_abs_diff_eq!(between.mean_square, 27.0, epsilon = 1e-10);
        assert_abs_diff_eq!(table.residual.mean_square, 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(between.f_ratio, 27.0, epsilon = 1e-9);
        // for df1 = 2 the tail is (1 + 2F/df2)^(-df2/2) = 10^-3
        assert_relative_eq!(between.p_value, 0.001, max_relative = 1e-6);
        assert!(between.significant);
        assert_abs_diff_eq!(between.eta_squared, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(between.partial_eta_squared, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_critical_value_closed_form() {
        // (1 + F/3)^-3 = 0.05 for F(2, 6)
        let expected = 3.0 * (0.05_f64.powf(-1.0 / 3.0) - 1.0);
        let critical = f_critical_value(0.05, 2, 6).unwrap();
        assert_relative_eq!(critical, expected, max_relative = 1e-9);
        assert_relative_eq!(f_upper_tail(critical, 2, 6).unwrap(), 0.05, max_relative = 1e-9);
    }

    #[test]
    fn test_upper_tail_edges() {
        assert_eq!(f_upper_tail(0.0, 3, 10).unwrap(), 1.0);
        assert_eq!(f_upper_tail(f64::INFINITY, 3, 10).unwrap(), 0.0);
        assert!(f_upper_tail(f64::NAN, 3, 10).is_err());
        assert!(f_upper_tail(1.0, 0, 10).is_err());
    }

    #[test]
    fn test_equal_means_fail_to_reject() {
        let design = build_one_way(vec![
            ("G1", vec![1.0, 5.0]),
            ("G2", vec![2.0, 4.0]),
            ("G3", vec![3.0, 3.0]),
        ])
        .unwrap();
        let ss = decompose(&design).unwrap();
        let table = compute_f(&ss, &design, 0.05).unwrap();
        let between = table.get(Effect::Factor(0)).unwrap();

        assert_eq!(between.f_ratio, 0.0);
        assert_eq!(between.p_value, 1.0);
        assert!(!between.significant);
    }

    #[test]
    fn test_small_effect_against_dominant_factor() {
        // B shifts the response by 1000, A by 1e-4, replicates differ by 1e-6
        let design = build_two_way(vec![
            (("a1", "b1"), vec![0.0, 1e-6]),
            (("a1", "b2"), vec![1000.0, 1000.0 + 1e-6]),
            (("a2", "b1"), vec![1e-4, 1e-4 + 1e-6]),
            (("a2", "b2"), vec![1000.0 + 1e-4, 1000.0 + 1e-4 + 1e-6]),
        ])
        .unwrap();
        let ss = decompose(&design).unwrap();
        let table = compute_f(&ss, &design, 0.05).unwrap();
        let a = table.get(Effect::Factor(0)).unwrap();

        assert!(a.sum_of_squares < 1e-9 * ss.total);
        assert_relative_eq!(a.f_ratio, a.mean_square / table.residual.mean_square);
        assert!(a.f_ratio > 1e3);
        assert!(a.significant);
        assert!(table.get(Effect::Factor(1)).unwrap().significant);
    }

    #[test]
    fn test_zero_residual_variance_is_infinite_f() {
        let design = build_one_way(vec![("G1", vec![5.0, 5.0, 5.0]), ("G2", vec![7.0, 7.0, 7.0])])
            .unwrap();
        let ss = decompose(&design).unwrap();
        let table = compute_f(&ss, &design, 0.05).unwrap();
        let between = table.get(Effect::Factor(0)).unwrap();

        assert_eq!(table.residual.mean_square, 0.0);
        assert!(between.f_ratio.is_infinite());
        assert_eq!(between.p_value, 0.0);
        assert!(between.significant);
    }

    #[test]
    fn test_one_observation_per_cell_has_no_error_df() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1.0]),
            (("a1", "b2"), vec![2.0]),
            (("a2", "b1"), vec![3.0]),
            (("a2", "b2"), vec![5.0]),
        ])
        .unwrap();
        let ss = decompose(&design).unwrap();
        match compute_f(&ss, &design, 0.05) {
            Err(AnovaError::InsufficientDegreesOfFreedom {
                observations,
                cells,
                residual_df,
            }) => {
                assert_eq!((observations, cells, residual_df), (4, 4, 0));
            }
            other => panic!("expected InsufficientDegreesOfFreedom, got {other:?}"),
        }
    }

    #[test]
    fn test_two_way_df_consistency() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1.0, 2.0]),
            (("a1", "b2"), vec![2.0, 3.0, 4.0]),
            (("a1", "b3"), vec![3.0]),
            (("a2", "b1"), vec![5.0, 6.0]),
            (("a2", "b2"), vec![6.0]),
            (("a2", "b3"), vec![9.0, 8.0]),
        ])
        .unwrap();
        let df = degrees_of_freedom(&design).unwrap();

        assert_eq!(df.effect(Effect::Factor(0)), Some(1));
        assert_eq!(df.effect(Effect::Factor(1)), Some(2));
        assert_eq!(df.effect(Effect::Interaction), Some(2));
        assert_eq!(df.error, 11 - 6);
        let sum: usize = df.effects.iter().map(|(_, d)| d).sum::<usize>() + df.error;
        assert_eq!(sum, df.total);
    }

    #[test]
    fn test_two_way_balanced_verdicts() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1.0, 3.0]),
            (("a1", "b2"), vec![4.0, 6.0]),
            (("a2", "b1"), vec![5.0, 7.0]),
            (("a2", "b2"), vec![8.0, 10.0]),
        ])
        .unwrap();
        let ss = decompose(&design).unwrap();
        let table = compute_f(&ss, &design, 0.05).unwrap();

        let a = table.get(Effect::Factor(0)).unwrap();
        let b = table.get(Effect::Factor(1)).unwrap();
        let ab = table.get(Effect::Interaction).unwrap();

        assert_abs_diff_eq!(a.f_ratio, 16.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.f_ratio, 9.0, epsilon = 1e-9);
        assert_eq!(ab.f_ratio, 0.0);
        assert!(a.significant);
        assert!(b.significant);
        assert!(b.p_value > 0.03 && b.p_value < 0.05);
        assert!(!ab.significant);
        assert_eq!(table.significant_effects().count(), 2);
    }

    #[test]
    fn test_invalid_alpha() {
        let design = scenario_one();
        let ss = decompose(&design).unwrap();
        assert_eq!(
            compute_f(&ss, &design, 1.5).unwrap_err(),
            AnovaError::InvalidAlpha(1.5)
        );
    }
}
