//! Report assembly.
//!
//! Combines a design summary, the F-table and the diagnostics into one immutable
//! [`Report`] with an interpretation line per effect. Nothing is recomputed here;
//! the numbers are copied from upstream results unchanged. This is the only part
//! of the engine that produces human-facing text.

use std::fmt;

use crate::decomposition::{Effect, SumOfSquares, SumOfSquaresType};
use crate::design::{Design, DesignKind};
use crate::diagnostics::{DesignDiagnostics, Verdict};
use crate::inference::{FTable, FTestResult, ResidualTerm, TotalTerm};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactorSummary {
    pub name: String,
    pub levels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellSummary {
    pub label: String,
    pub size: usize,
    pub mean: f64,
    /// Sample variance; `None` for a single observation.
    pub variance: Option<f64>,
}

/// Final result of one analysis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Report {
    pub kind: DesignKind,
    pub alpha: f64,
    pub grand_mean: f64,
    pub observations: usize,
    pub balanced: bool,
    pub factors: Vec<FactorSummary>,
    pub cells: Vec<CellSummary>,
    pub sum_of_squares: SumOfSquares,
    pub effects: Vec<FTestResult>,
    pub residual: ResidualTerm,
    pub total: TotalTerm,
    pub diagnostics: DesignDiagnostics,
    /// One line per effect, in effect order.
    pub interpretations: Vec<String>,
    /// Assumption and design caveats; empty when nothing needs flagging.
    pub caveats: Vec<String>,
}

impl Report {
    pub fn effect(&self, effect: Effect) -> Option<&FTestResult> {
        self.effects.iter().find(|r| r.effect == effect)
    }

    pub fn significant_effects(&self) -> impl Iterator<Item = &FTestResult> {
        self.effects.iter().filter(|r| r.significant)
    }

    /// Whether every diagnostic passed, so the parametric result can be taken at
    /// face value.
    pub fn assumptions_hold(&self) -> bool {
        self.diagnostics.all_passed()
    }
}

/// Aggregate a design, its diagnostics and its F-table into a report.
pub fn assemble_report(
    design: &Design,
    diagnostics: DesignDiagnostics,
    f_results: FTable,
) -> Report {
    let factors = design
        .factors()
        .iter()
        .map(|f| FactorSummary {
            name: f.name().to_string(),
            levels: f.levels().to_vec(),
        })
        .collect();
    let cells = design
        .cells()
        .iter()
        .map(|c| CellSummary {
            label: c.label().to_string(),
            size: c.len(),
            mean: c.mean(),
            variance: c.variance(),
        })
        .collect();

    let interpretations = f_results
        .effects
        .iter()
        .map(|r| interpret(r, design))
        .collect();
    let caveats = caveats(design, &diagnostics, &f_results);
    let alpha = f_results.effects.first().map_or(0.05, |r| r.alpha);

    let FTable {
        effects,
        residual,
        total,
        sum_of_squares,
    } = f_results;

    Report {
        kind: design.kind(),
        alpha,
        grand_mean: design.grand_mean(),
        observations: design.num_observations(),
        balanced: design.is_balanced(),
        factors,
        cells,
        sum_of_squares,
        effects,
        residual,
        total,
        diagnostics,
        interpretations,
        caveats,
    }
}

fn interpret(result: &FTestResult, design: &Design) -> String {
    let subject = match result.effect {
        Effect::Factor(_) => format!("Main effect of {}", result.label),
        Effect::Interaction => {
            let name = |idx: usize| design.factor(idx).map_or("?", |f| f.name());
            format!("Interaction of {} and {}", name(0), name(1))
        }
    };
    let verdict = if result.significant {
        "significant"
    } else {
        "not significant"
    };
    format!("{subject}: {verdict} ({})", format_p_value(result.p_value))
}

fn caveats(design: &Design, diagnostics: &DesignDiagnostics, table: &FTable) -> Vec<String> {
    let mut caveats = Vec::new();

    for cell in &diagnostics.normality {
        let test = cell.result.test.name();
        match cell.result.verdict {
            Verdict::Fail => caveats.push(format!(
                "Normality rejected for {} ({test}, {})",
                cell.cell,
                cell.result.p_value.map_or_else(String::new, format_p_value)
            )),
            Verdict::Inconclusive => caveats.push(format!(
                "Normality inconclusive for {} ({})",
                cell.cell,
                cell.result.note.as_deref().unwrap_or("not testable")
            )),
            Verdict::Pass => {}
        }
    }

    let homogeneity = &diagnostics.homogeneity;
    match homogeneity.verdict {
        Verdict::Fail => caveats.push(format!(
            "Homogeneity of variance rejected ({}, {})",
            homogeneity.test.name(),
            homogeneity.p_value.map_or_else(String::new, format_p_value)
        )),
        Verdict::Inconclusive => caveats.push(format!(
            "Homogeneity of variance inconclusive ({})",
            homogeneity.note.as_deref().unwrap_or("not testable")
        )),
        Verdict::Pass => {}
    }

    if design.kind() == DesignKind::TwoWay
        && !design.is_balanced()
        && table.sum_of_squares.method == SumOfSquaresType::Sequential
    {
        caveats.push(format!(
            "Unbalanced design: sequential (Type I) sums of squares, {} adjusted for {}",
            Effect::Factor(1).label(design),
            Effect::Factor(0).label(design)
        ));
    }
    if table.residual.mean_square == 0.0 {
        caveats.push(
            "Zero residual variance: F-ratios of non-zero effects are infinite".to_string(),
        );
    }
    caveats
}

/// `p=0.0021`, or `p<0.0001` for very small values.
pub fn format_p_value(p: f64) -> String {
    if p < 1e-4 {
        "p<0.0001".to_string()
    } else {
        format!("p={p:.4}")
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>12} {:>6} {:>12} {:>10} {:>10}",
            "Source", "SS", "df", "MS", "F", "p"
        )?;
        for r in &self.effects {
            writeln!(
                f,
                "{:<24} {:>12.4} {:>6} {:>12.4} {:>10.4} {:>10.4}",
                r.label, r.sum_of_squares, r.degrees_of_freedom, r.mean_square, r.f_ratio, r.p_value
            )?;
        }
        writeln!(
            f,
            "{:<24} {:>12.4} {:>6} {:>12.4}",
            "Residual",
            self.residual.sum_of_squares,
            self.residual.degrees_of_freedom,
            self.residual.mean_square
        )?;
        writeln!(
            f,
            "{:<24} {:>12.4} {:>6}",
            "Total", self.total.sum_of_squares, self.total.degrees_of_freedom
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Grand mean: {:.4} (N = {}, alpha = {})",
            self.grand_mean, self.observations, self.alpha
        )?;
        for line in &self.interpretations {
            writeln!(f, "{line}")?;
        }
        for caveat in &self.caveats {
            writeln!(f, "Caveat: {caveat}")?;
        }
        Ok(())
    }
}
