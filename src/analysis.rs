//! End-to-end analysis pipeline.
//!
//! `design → diagnostics → decomposition → F-tests → report`. Every step consumes
//! immutable values and produces a new one; there is no shared state between
//! analyses, so independent designs can be analysed in parallel with
//! [`analyze_batch`].

use anyhow::Context;
use rayon::prelude::*;

use crate::decomposition::decompose;
use crate::design::Design;
use crate::diagnostics::{LeveneCenter, NormalityTest, diagnose};
use crate::error::{Result, validate_alpha};
use crate::inference::compute_f;
use crate::report::{Report, assemble_report};

/// Configuration of an analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// Significance level for the F-tests and the diagnostics (default: 0.05).
    pub alpha: f64,
    /// Normality test run on every group or cell (default: Shapiro-Wilk).
    pub normality_test: NormalityTest,
    /// Centre of Levene's homogeneity test (default: median).
    pub levene_center: LeveneCenter,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            normality_test: NormalityTest::default(),
            levene_center: LeveneCenter::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_normality_test(mut self, test: NormalityTest) -> Self {
        self.normality_test = test;
        self
    }

    pub fn with_levene_center(mut self, center: LeveneCenter) -> Self {
        self.levene_center = center;
        self
    }

    /// Reject an alpha outside (0, 1).
    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.alpha)
    }
}

/// Run the full analysis of one design.
///
/// Diagnostics are attached to the report but never stop the analysis. Errors
/// from the design (too few residual degrees of freedom) or from the engine's
/// consistency checks are returned unchanged.
///
/// # Example
///
/// ```
/// use anova_engine::analysis::{analyze, AnalysisConfig};
/// use anova_engine::design::build_one_way;
///
/// let design = build_one_way(vec![
///     ("G1", vec![2.0, 3.0, 4.0]),
///     ("G2", vec![5.0, 6.0, 7.0]),
///     ("G3", vec![8.0, 9.0, 10.0]),
/// ])?;
/// let report = analyze(&design, &AnalysisConfig::default())?;
///
/// assert_eq!(report.interpretations[0], "Main effect of A: significant (p=0.0010)");
/// # Ok::<(), anova_engine::AnovaError>(())
/// ```
#[tracing::instrument(skip_all, fields(kind = ?design.kind(), n = design.num_observations()))]
pub fn analyze(design: &Design, config: &AnalysisConfig) -> Result<Report> {
    config.validate()?;

    let diagnostics = diagnose(design, config.alpha, config.normality_test, config.levene_center)?;
    let ss = decompose(design)?;
    let table = compute_f(&ss, design, config.alpha)?;

    tracing::debug!(
        significant = table.significant_effects().count(),
        assumptions_hold = diagnostics.all_passed(),
        "analysis complete"
    );
    Ok(assemble_report(design, diagnostics, table))
}

/// Analyse many independent designs on the rayon thread pool.
///
/// Reports come back in input order. The first failing design aborts the batch;
/// its index is attached as context and the underlying
/// [`AnovaError`](crate::AnovaError) can be recovered with `downcast_ref`.
pub fn analyze_batch(designs: &[Design], config: &AnalysisConfig) -> anyhow::Result<Vec<Report>> {
    config.validate().context("invalid analysis configuration")?;

    designs
        .par_iter()
        .enumerate()
        .map(|(idx, design)| {
            analyze(design, config).with_context(|| format!("analysis of design {idx} failed"))
        })
        .collect()
}
