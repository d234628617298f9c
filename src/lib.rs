//! # anova-engine
//!
//! One-way and two-way fixed-effects analysis of variance, part of the single-rust ecosystem.
//!
//! The crate partitions the total variability of a numeric response into components attributable
//! to one or two categorical factors (and their interaction) plus residual error, tests each
//! component with an F-ratio against the residual mean square, and checks the model's normality
//! and homogeneity-of-variance assumptions on the same data.
//!
//! ## Core Features
//!
//! - **Validated designs**: One-way groups or fully crossed two-way cells, balanced or not
//! - **Sum-of-squares decomposition**: `SS_total = Σ SS_effect + SS_error`, verified on every run
//! - **F-tests**: p-values, critical values and effect sizes (eta², partial eta²)
//! - **Assumption diagnostics**: Shapiro-Wilk or Anderson-Darling per cell, Levene/Brown-Forsythe
//! - **Batch analysis**: Independent designs analysed in parallel with rayon
//!
//! ## Quick Start
//!
//! Build a [`Design`] with [`build_one_way`] or [`build_two_way`] and pass it to [`analyze`]
//! together with an [`AnalysisConfig`]. The returned [`Report`] carries the full ANOVA table,
//! the diagnostics and one interpretation line per effect.
//!
//! ```
//! use anova_engine::prelude::*;
//!
//! let design = build_two_way(vec![
//!     (("low", "control"), vec![2.0, 4.0]),
//!     (("low", "treated"), vec![6.0, 8.0]),
//!     (("high", "control"), vec![6.0, 8.0]),
//!     (("high", "treated"), vec![10.0, 12.0]),
//! ])?
//! .with_factor_names(&["Dose", "Treatment"])?;
//!
//! let report = analyze(&design, &AnalysisConfig::default())?;
//! assert!(report.effect(Effect::Factor(0)).is_some_and(|r| r.significant));
//! assert!(report.effect(Effect::Interaction).is_some_and(|r| !r.significant));
//! # Ok::<(), anova_engine::AnovaError>(())
//! ```
//!
//! ## Module Organization
//!
//! - **[`design`]**: Group and cell construction, validation and summary statistics
//! - **[`decomposition`]**: Partition of the total sum of squares
//! - **[`inference`]**: Degrees of freedom, F-ratios, p-values and critical values
//! - **[`diagnostics`]**: Normality and homogeneity-of-variance checks
//! - **[`report`]**: Aggregated, immutable analysis result
//! - **[`analysis`]**: End-to-end pipeline, configuration and batch runner

pub mod analysis;
pub mod decomposition;
pub mod design;
pub mod diagnostics;
pub mod error;
pub mod inference;
pub mod report;

pub use analysis::{AnalysisConfig, analyze, analyze_batch};
pub use decomposition::{Effect, SumOfSquares, decompose};
pub use design::{Design, DesignKind, build_one_way, build_two_way};
pub use error::{AnovaError, Result};
pub use inference::{FTable, FTestResult, compute_f};
pub use report::Report;

pub mod prelude {
    pub use crate::analysis::{AnalysisConfig, analyze, analyze_batch};
    pub use crate::decomposition::{Effect, SumOfSquares, decompose};
    pub use crate::design::{Design, DesignKind, build_one_way, build_two_way};
    pub use crate::diagnostics::{LeveneCenter, NormalityTest, Verdict, diagnose};
    pub use crate::error::{AnovaError, Result};
    pub use crate::inference::{FTable, FTestResult, compute_f};
    pub use crate::report::{Report, assemble_report};
}
