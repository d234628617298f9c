//! Levene's test for homogeneity of variance.
//!
//! The statistic is the one-way ANOVA F-ratio of the absolute deviations
//! `|y_ij - c_i|`, where `c_i` is each group's median (Brown-Forsythe) or mean
//! (classical Levene). It is computed with the same decomposition and F engine as
//! the main analysis.

use crate::decomposition::{Effect, decompose_one_way};
use crate::design::build_one_way;
use crate::design::moments::median;
use crate::error::{AnovaError, Result};
use crate::inference::compute_f;

use super::LeveneCenter;

/// Levene W statistic with its F degrees of freedom and p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeveneStatistic {
    pub statistic: f64,
    pub p_value: f64,
    pub df_between: usize,
    pub df_within: usize,
}

/// Compute Levene's W over groups of observations.
///
/// Returns `None` unless at least two groups have two or more observations.
/// Every group must be non-empty.
pub fn levene(groups: &[Vec<f64>], center: LeveneCenter) -> Result<Option<LeveneStatistic>> {
    if groups.len() < 2 {
        return Err(AnovaError::invalid_design(format!(
            "homogeneity of variance needs at least 2 groups, got {}",
            groups.len()
        )));
    }
    if let Some(idx) = groups.iter().position(|g| g.is_empty()) {
        return Err(AnovaError::invalid_design(format!(
            "group {} has no observations",
            idx + 1
        )));
    }
    if groups.iter().filter(|g| g.len() >= 2).count() < 2 {
        return Ok(None);
    }

    let deviations = groups.iter().enumerate().map(|(idx, group)| {
        let c = match center {
            LeveneCenter::Median => median(group).unwrap_or_default(),
            LeveneCenter::Mean => group.iter().sum::<f64>() / group.len() as f64,
        };
        (
            format!("group {}", idx + 1),
            group.iter().map(|y| (y - c).abs()).collect::<Vec<f64>>(),
        )
    });

    let design = build_one_way(deviations)?;
    let ss = decompose_one_way(&design)?;
    // alpha only sets the critical value, which Levene does not report
    let table = compute_f(&ss, &design, 0.05)?;
    let between = table
        .get(Effect::Factor(0))
        .ok_or_else(|| AnovaError::invalid_design("missing between-groups effect"))?;

    Ok(Some(LeveneStatistic {
        statistic: between.f_ratio,
        p_value: between.p_value,
        df_between: between.degrees_of_freedom,
        df_within: table.residual.degrees_of_freedom,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_equal_spread_gives_zero_statistic() {
        let groups = vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![11.0, 12.0, 13.0, 14.0, 15.0],
            vec![21.0, 22.0, 23.0, 24.0, 25.0],
        ];
        let result = levene(&groups, LeveneCenter::Median).unwrap().unwrap();

        assert_abs_diff_eq!(result.statistic, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.p_value, 1.0, epsilon = 1e-12);
        assert_eq!((result.df_between, result.df_within), (2, 12));
    }

    #[test]
    fn test_unequal_spread_is_detected() {
        let groups = vec![
            vec![9.9, 10.0, 10.1, 10.0, 9.95, 10.05],
            vec![0.0, 20.0, 5.0, 15.0, -5.0, 25.0],
        ];
        let result = levene(&groups, LeveneCenter::Median).unwrap().unwrap();

        assert!(result.statistic > 20.0);
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn test_mean_centre_constant_deviations() {
        // deviations from means: [1, 1] and [2, 2]
        let groups = vec![vec![1.0, 3.0], vec![0.0, 4.0]];
        let result = levene(&groups, LeveneCenter::Mean).unwrap().unwrap();
        // zero within-group spread of deviations with different group means
        assert!(result.statistic.is_infinite());
        assert_eq!(result.p_value, 0.0);
    }

    #[test]
    fn test_insufficient_replication_is_none() {
        let groups = vec![vec![1.0, 2.0, 3.0], vec![4.0], vec![7.0]];
        assert!(levene(&groups, LeveneCenter::Median).unwrap().is_none());
    }

    #[test]
    fn test_malformed_groups() {
        assert!(levene(&[vec![1.0, 2.0]], LeveneCenter::Median).is_err());
        assert!(levene(&[vec![1.0, 2.0], vec![]], LeveneCenter::Median).is_err());
    }
}
