//! Sum-of-squares decomposition.
//!
//! Partitions the total sum of squares of a [`Design`] into effect and error
//! components:
//!
//! - one-way: `SS_total = SS_between + SS_within`
//! - two-way: `SS_total = SS_A + SS_B + SS_AB + SS_error`
//!
//! The identity is checked on every decomposition against a directly computed
//! `SS_total`; a mismatch beyond [`RELATIVE_TOLERANCE`] is reported as
//! [`AnovaError::DecompositionInvariant`] instead of returning inconsistent numbers.
//!
//! Two-way designs use sequential (Type I) sums of squares in the order A, B, A:B.
//! See [`two_way`] for how unbalanced designs are handled.

use crate::design::moments::compensated_sum;
use crate::design::{Design, DesignKind};
use crate::error::{AnovaError, Result};

pub mod two_way;

/// Relative tolerance of the sum-of-squares identity.
pub const RELATIVE_TOLERANCE: f64 = 1e-9;

/// A source of variation tested against the residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Effect {
    /// Main effect of the factor with this index (the between-groups effect of a
    /// one-way design is `Factor(0)`).
    Factor(usize),
    /// Interaction of the two factors of a two-way design.
    Interaction,
}

impl Effect {
    /// Label using the design's factor names, e.g. `Substance` or `Substance:Iconography`.
    pub fn label(&self, design: &Design) -> String {
        let name = |idx: usize| {
            design
                .factor(idx)
                .map_or_else(|| format!("factor {idx}"), |f| f.name().to_string())
        };
        match self {
            Effect::Factor(idx) => name(*idx),
            Effect::Interaction => format!("{}:{}", name(0), name(1)),
        }
    }
}

/// Convention used to attribute sums of squares to effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SumOfSquaresType {
    /// Type I: each effect is adjusted for the effects listed before it.
    #[default]
    Sequential,
}

/// Sum of squares attributed to one effect.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectSumOfSquares {
    pub effect: Effect,
    pub value: f64,
}

/// Result of a decomposition. All components are non-negative and sum to `total`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SumOfSquares {
    pub method: SumOfSquaresType,
    pub total: f64,
    /// Effects in test order: `[A]` or `[A, B, A:B]`.
    pub effects: Vec<EffectSumOfSquares>,
    /// Within-group (one-way) or within-cell (two-way) residual.
    pub error: f64,
}

impl SumOfSquares {
    pub fn effect(&self, effect: Effect) -> Option<f64> {
        self.effects
            .iter()
            .find(|e| e.effect == effect)
            .map(|e| e.value)
    }

    /// Sum of all effect components.
    pub fn explained(&self) -> f64 {
        self.effects.iter().map(|e| e.value).sum()
    }
}

/// Decompose a design according to its kind.
pub fn decompose(design: &Design) -> Result<SumOfSquares> {
    match design.kind() {
        DesignKind::OneWay => decompose_one_way(design),
        DesignKind::TwoWay => decompose_two_way(design),
    }
}

/// One-way decomposition into between-group and within-group sums of squares.
///
/// `SS_between = Σ nᵢ(ȳᵢ - ȳ)²` is weighted by group size and
/// `SS_within = ΣΣ (yᵢⱼ - ȳᵢ)²` is a second pass over each group around its mean.
/// Both are taken on observations shifted by the design origin, as is `SS_total`.
pub fn decompose_one_way(design: &Design) -> Result<SumOfSquares> {
    if design.kind() != DesignKind::OneWay {
        return Err(AnovaError::invalid_design(
            "one-way decomposition requires a one-way design",
        ));
    }
    let grand_mean = design.centred_grand_mean();

    let between = compensated_sum(
        design
            .cells()
            .iter()
            .map(|g| g.len() as f64 * (g.centred_mean() - grand_mean).powi(2)),
    );
    let within = compensated_sum(design.cells().iter().map(|g| g.sum_of_squares()));
    let total = total_sum_of_squares(design);

    let ss = SumOfSquares {
        method: SumOfSquaresType::Sequential,
        total,
        effects: vec![EffectSumOfSquares {
            effect: Effect::Factor(0),
            value: between,
        }],
        error: within,
    };
    check_invariant(&ss)?;

    tracing::debug!(
        total = ss.total,
        between,
        within,
        "one-way sums of squares"
    );
    Ok(ss)
}

/// Two-way sequential (Type I) decomposition into A, B, A:B and error.
///
/// For balanced or proportional designs this equals the textbook closed forms:
///
/// - `SS_A = Σᵢ nᵢ·(ȳᵢ· - ȳ)²`
/// - `SS_B = Σⱼ n·ⱼ(ȳ·ⱼ - ȳ)²`
/// - `SS_AB = Σᵢⱼ nᵢⱼ(ȳᵢⱼ - ȳᵢ· - ȳ·ⱼ + ȳ)²`
/// - `SS_error = ΣᵢⱼΣₖ (yᵢⱼₖ - ȳᵢⱼ)²`
///
/// For other unbalanced designs `SS_B` is adjusted for A and `SS_AB` for both
/// main effects, so the identity with `SS_total` still holds exactly.
pub fn decompose_two_way(design: &Design) -> Result<SumOfSquares> {
    if design.kind() != DesignKind::TwoWay {
        return Err(AnovaError::invalid_design(
            "two-way decomposition requires a two-way design",
        ));
    }
    let parts = two_way::sequential(design)?;
    let error = compensated_sum(design.cells().iter().map(|c| c.sum_of_squares()));
    let total = total_sum_of_squares(design);

    let ss = SumOfSquares {
        method: SumOfSquaresType::Sequential,
        total,
        effects: vec![
            EffectSumOfSquares {
                effect: Effect::Factor(0),
                value: parts.factor_a,
            },
            EffectSumOfSquares {
                effect: Effect::Factor(1),
                value: parts.factor_b,
            },
            EffectSumOfSquares {
                effect: Effect::Interaction,
                value: parts.interaction,
            },
        ],
        error,
    };
    check_invariant(&ss)?;

    tracing::debug!(
        total = ss.total,
        factor_a = parts.factor_a,
        factor_b = parts.factor_b,
        interaction = parts.interaction,
        error,
        balanced = design.is_balanced(),
        "two-way sums of squares"
    );
    Ok(ss)
}

/// `Σ (y - ȳ)²` over every observation, taken directly from the shifted data.
fn total_sum_of_squares(design: &Design) -> f64 {
    let origin = design.origin();
    let grand_mean = design.centred_grand_mean();
    compensated_sum(design.observations().map(|y| (y - origin - grand_mean).powi(2)))
}

fn check_invariant(ss: &SumOfSquares) -> Result<()> {
    let parts = ss.explained() + ss.error;
    let scale = ss.total.abs().max(parts.abs());
    if scale < f64::MIN_POSITIVE {
        return Ok(());
    }
    let relative_error = (ss.total - parts).abs() / scale;
    if relative_error > RELATIVE_TOLERANCE
        || ss.effects.iter().any(|e| e.value < 0.0)
        || ss.error < 0.0
    {
        return Err(AnovaError::DecompositionInvariant {
            total: ss.total,
            parts,
            relative_error,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{build_one_way, build_two_way};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_one_way_hand_computed() {
        let design = build_one_way(vec![
            ("G1", vec![2.0, 3.0, 4.0]),
            ("G2", vec![5.0, 6.0, 7.0]),
            ("G3", vec![8.0, 9.0, 10.0]),
        ])
        .unwrap();
        let ss = decompose_one_way(&design).unwrap();

        assert_eq!(ss.method, SumOfSquaresType::Sequential);
        assert_abs_diff_eq!(ss.effect(Effect::Factor(0)).unwrap(), 54.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.error, 6.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.total, 60.0, epsilon = 1e-10);
    }

    #[test]
    fn test_one_way_unbalanced_weights_by_size() {
        let design = build_one_way(vec![
            ("G1", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ("G2", vec![10.0, 12.0]),
        ])
        .unwrap();
        let ss = decompose_one_way(&design).unwrap();

        // grand mean = 37 / 7, group means 3 and 11
        let g: f64 = 37.0 / 7.0;
        let expected_between = 5.0 * (3.0 - g).powi(2) + 2.0 * (11.0 - g).powi(2);
        let between = ss.effect(Effect::Factor(0)).unwrap();
        assert_abs_diff_eq!(between, expected_between, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.error, 10.0 + 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.total, ss.explained() + ss.error, epsilon = 1e-9);
    }

    #[test]
    fn test_equal_group_means_give_zero_between() {
        let design = build_one_way(vec![
            ("G1", vec![1.0, 5.0]),
            ("G2", vec![2.0, 4.0]),
            ("G3", vec![3.0, 3.0]),
        ])
        .unwrap();
        let ss = decompose(&design).unwrap();
        assert_abs_diff_eq!(ss.effect(Effect::Factor(0)).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_two_way_additive_balanced() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1.0, 3.0]),
            (("a1", "b2"), vec![4.0, 6.0]),
            (("a2", "b1"), vec![5.0, 7.0]),
            (("a2", "b2"), vec![8.0, 10.0]),
        ])
        .unwrap();
        let ss = decompose_two_way(&design).unwrap();

        assert_abs_diff_eq!(ss.effect(Effect::Factor(0)).unwrap(), 32.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.effect(Effect::Factor(1)).unwrap(), 18.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.effect(Effect::Interaction).unwrap(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.error, 8.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.total, 58.0, epsilon = 1e-10);
    }

    #[test]
    fn test_two_way_pure_interaction() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1.0, 3.0]),
            (("a1", "b2"), vec![8.0, 10.0]),
            (("a2", "b1"), vec![8.0, 10.0]),
            (("a2", "b2"), vec![1.0, 3.0]),
        ])
        .unwrap();
        let ss = decompose(&design).unwrap();

        assert_abs_diff_eq!(ss.effect(Effect::Factor(0)).unwrap(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.effect(Effect::Factor(1)).unwrap(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.effect(Effect::Interaction).unwrap(), 98.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ss.error, 8.0, epsilon = 1e-10);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let one_way = build_one_way(vec![("x", vec![1.0, 2.0]), ("y", vec![3.0])]).unwrap();
        assert!(decompose_two_way(&one_way).is_err());
    }

    #[test]
    fn test_invariant_violation_is_reported() {
        let ss = SumOfSquares {
            method: SumOfSquaresType::Sequential,
            total: 10.0,
            effects: vec![EffectSumOfSquares {
                effect: Effect::Factor(0),
                value: 4.0,
            }],
            error: 5.0,
        };
        match check_invariant(&ss) {
            Err(AnovaError::DecompositionInvariant { parts, .. }) => {
                assert_abs_diff_eq!(parts, 9.0)
            }
            other => panic!("expected invariant error, got {other:?}"),
        }
    }

    fn offset_groups(offset: f64, groups: usize, size: usize) -> Vec<(String, Vec<f64>)> {
        (0..groups)
            .map(|g| {
                let values = (0..size)
                    .map(|i| {
                        let spread = 0.15 * ((i * 7 + g * 3) % 11) as f64 / 10.0;
                        offset + 0.01 * g as f64 + spread
                    })
                    .collect();
                (format!("G{g}"), values)
            })
            .collect()
    }

    #[test]
    fn test_one_way_large_offset_keeps_identity() {
        for offset in [1e7, 1e9, -3e9] {
            let design = build_one_way(offset_groups(offset, 3, 50)).unwrap();
            let ss = decompose_one_way(&design).unwrap();

            assert!(ss.error > 0.0);
            assert_abs_diff_eq!(ss.total, ss.explained() + ss.error, epsilon = 1e-9 * ss.total);
        }
    }

    #[test]
    fn test_offset_does_not_change_sums_of_squares() {
        let small = decompose(&build_one_way(offset_groups(0.0, 3, 50)).unwrap()).unwrap();
        let large = decompose(&build_one_way(offset_groups(1e9, 3, 50)).unwrap()).unwrap();

        // values near 1e9 are only representable to about 1.2e-7
        assert_abs_diff_eq!(small.error, large.error, epsilon = 1e-4 * small.error);
        assert_abs_diff_eq!(small.total, large.total, epsilon = 1e-4 * small.total);
    }

    #[test]
    fn test_two_way_large_offset_keeps_identity() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1e9 + 0.11, 1e9 + 0.13, 1e9 + 0.18]),
            (("a1", "b2"), vec![1e9 + 0.21, 1e9 + 0.27]),
            (("a2", "b1"), vec![1e9 + 0.12, 1e9 + 0.19, 1e9 + 0.14, 1e9 + 0.16]),
            (("a2", "b2"), vec![1e9 + 0.35, 1e9 + 0.31, 1e9 + 0.38]),
        ])
        .unwrap();
        let ss = decompose_two_way(&design).unwrap();

        assert!(ss.effects.iter().all(|e| e.value >= 0.0));
        assert_abs_diff_eq!(ss.total, ss.explained() + ss.error, epsilon = 1e-9 * ss.total);
    }

    #[test]
    fn test_effect_labels() {
        let design = build_two_way(vec![
            (("a1", "b1"), vec![1.0]),
            (("a1", "b2"), vec![2.0]),
            (("a2", "b1"), vec![3.0]),
            (("a2", "b2"), vec![4.0]),
        ])
        .unwrap()
        .with_factor_names(&["Substance", "Iconography"])
        .unwrap();

        assert_eq!(Effect::Factor(1).label(&design), "Iconography");
        assert_eq!(Effect::Interaction.label(&design), "Substance:Iconography");
    }
}
