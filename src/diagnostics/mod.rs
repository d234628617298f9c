//! Assumption diagnostics run before the F-test.
//!
//! Normality is checked per group or cell and homogeneity of variance across all
//! of them. Diagnostics are advisory: they never block the decomposition, but their
//! verdicts travel with the report so a caller can judge whether the parametric
//! result is trustworthy.
//!
//! Verdicts have three states. Samples too small to test reliably (fewer than
//! [`MIN_NORMALITY_SAMPLE`] observations), or whose statistic is undefined, get
//! [`Verdict::Inconclusive`] instead of a forced pass or fail.

use single_utilities::traits::FloatOps;

use crate::design::Design;
use crate::error::{AnovaError, Result, validate_alpha};

pub mod homogeneity;
pub mod normality;

/// Smallest sample on which a normality test is run.
pub const MIN_NORMALITY_SAMPLE: usize = 3;

/// Outcome of an assumption check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verdict {
    /// The assumption is not rejected at alpha.
    Pass,
    /// The assumption is rejected at alpha.
    Fail,
    /// The sample cannot be tested reliably.
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NormalityTest {
    /// Best suited to small samples.
    #[default]
    ShapiroWilk,
    /// More sensitive in the tails.
    AndersonDarling,
}

/// Centre used for the absolute deviations in Levene's test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LeveneCenter {
    /// Brown-Forsythe variant, robust to non-normal data.
    #[default]
    Median,
    /// Classical Levene test.
    Mean,
}

/// Which check produced a [`DiagnosticResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticTest {
    Normality(NormalityTest),
    Levene(LeveneCenter),
}

impl DiagnosticTest {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticTest::Normality(NormalityTest::ShapiroWilk) => "Shapiro-Wilk",
            DiagnosticTest::Normality(NormalityTest::AndersonDarling) => "Anderson-Darling",
            DiagnosticTest::Levene(LeveneCenter::Median) => "Levene (median)",
            DiagnosticTest::Levene(LeveneCenter::Mean) => "Levene (mean)",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticResult {
    pub test: DiagnosticTest,
    /// Test statistic; `None` when the verdict is inconclusive.
    pub statistic: Option<f64>,
    /// p-value; `None` when the verdict is inconclusive.
    pub p_value: Option<f64>,
    pub sample_size: usize,
    pub alpha: f64,
    pub verdict: Verdict,
    /// Why the verdict is inconclusive, or a caveat on the approximation.
    pub note: Option<String>,
}

impl DiagnosticResult {
    fn tested(
        test: DiagnosticTest,
        statistic: f64,
        p_value: f64,
        sample_size: usize,
        alpha: f64,
    ) -> Self {
        let verdict = if p_value < alpha {
            Verdict::Fail
        } else {
            Verdict::Pass
        };
        DiagnosticResult {
            test,
            statistic: Some(statistic),
            p_value: Some(p_value),
            sample_size,
            alpha,
            verdict,
            note: None,
        }
    }

    fn inconclusive(
        test: DiagnosticTest,
        sample_size: usize,
        alpha: f64,
        reason: impl Into<String>,
    ) -> Self {
        DiagnosticResult {
            test,
            statistic: None,
            p_value: None,
            sample_size,
            alpha,
            verdict: Verdict::Inconclusive,
            note: Some(reason.into()),
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn failed(&self) -> bool {
        self.verdict == Verdict::Fail
    }

    pub fn is_inconclusive(&self) -> bool {
        self.verdict == Verdict::Inconclusive
    }
}

/// Normality verdict of one group or cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellDiagnostic {
    pub cell: String,
    pub result: DiagnosticResult,
}

/// All diagnostics of a design.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DesignDiagnostics {
    pub normality: Vec<CellDiagnostic>,
    pub homogeneity: DiagnosticResult,
}

impl DesignDiagnostics {
    /// Whether every check passed; inconclusive checks do not count as passed.
    pub fn all_passed(&self) -> bool {
        self.homogeneity.passed() && self.normality.iter().all(|c| c.result.passed())
    }

    pub fn any_failed(&self) -> bool {
        self.homogeneity.failed() || self.normality.iter().any(|c| c.result.failed())
    }
}

/// Shapiro-Wilk normality check of one sample.
pub fn check_normality<T>(sample: &[T], alpha: f64) -> Result<DiagnosticResult>
where
    T: FloatOps,
{
    check_normality_with(sample, alpha, NormalityTest::ShapiroWilk)
}

/// Normality check of one sample with the chosen test.
///
/// Samples of fewer than [`MIN_NORMALITY_SAMPLE`] observations, and constant
/// samples, are [`Verdict::Inconclusive`].
pub fn check_normality_with<T>(
    sample: &[T],
    alpha: f64,
    test: NormalityTest,
) -> Result<DiagnosticResult>
where
    T: FloatOps,
{
    validate_alpha(alpha)?;
    let values = to_f64(sample)?;
    let kind = DiagnosticTest::Normality(test);
    let n = values.len();

    if n < MIN_NORMALITY_SAMPLE {
        return Ok(DiagnosticResult::inconclusive(
            kind,
            n,
            alpha,
            format!("{n} observations, at least {MIN_NORMALITY_SAMPLE} needed"),
        ));
    }

    let statistic = match test {
        NormalityTest::ShapiroWilk => normality::shapiro_wilk(&values),
        NormalityTest::AndersonDarling => normality::anderson_darling(&values),
    };

    let result = match statistic {
        Ok(Some(s)) => DiagnosticResult::tested(kind, s.statistic, s.p_value, n, alpha),
        Ok(None) => {
            DiagnosticResult::inconclusive(kind, n, alpha, "all observations are identical")
        }
        Err(err) if err.is_input_error() => return Err(err),
        Err(err) => {
            tracing::warn!(error = %err, "normality test could not be computed");
            DiagnosticResult::inconclusive(
                kind,
                n,
                alpha,
                format!("test could not be computed: {err}"),
            )
        }
    };

    if test == NormalityTest::ShapiroWilk && n > normality::SHAPIRO_WILK_MAX_N {
        return Ok(result.with_note(format!(
            "p-value approximation is calibrated up to n = {}",
            normality::SHAPIRO_WILK_MAX_N
        )));
    }
    Ok(result)
}

/// Median-centred Levene (Brown-Forsythe) check across groups.
pub fn check_homogeneity<S, T>(groups: &[S], alpha: f64) -> Result<DiagnosticResult>
where
    S: AsRef<[T]>,
    T: FloatOps,
{
    check_homogeneity_with(groups, alpha, LeveneCenter::Median)
}

/// Levene check across groups with the chosen centre.
///
/// Needs at least two non-empty groups; fewer than two groups with two or more
/// observations gives [`Verdict::Inconclusive`].
pub fn check_homogeneity_with<S, T>(
    groups: &[S],
    alpha: f64,
    center: LeveneCenter,
) -> Result<DiagnosticResult>
where
    S: AsRef<[T]>,
    T: FloatOps,
{
    validate_alpha(alpha)?;
    let values = groups
        .iter()
        .map(|g| to_f64(g.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let kind = DiagnosticTest::Levene(center);
    let n = values.iter().map(Vec::len).sum();

    levene_verdict(homogeneity::levene(&values, center), kind, n, alpha)
}

/// Malformed groups are the caller's error; a failure inside the Levene
/// computation itself only leaves homogeneity untested.
fn levene_verdict(
    outcome: Result<Option<homogeneity::LeveneStatistic>>,
    kind: DiagnosticTest,
    n: usize,
    alpha: f64,
) -> Result<DiagnosticResult> {
    match outcome {
        Ok(Some(w)) => Ok(DiagnosticResult::tested(kind, w.statistic, w.p_value, n, alpha)),
        Ok(None) => Ok(DiagnosticResult::inconclusive(
            kind,
            n,
            alpha,
            "fewer than 2 groups have 2 or more observations",
        )),
        Err(err) if err.is_input_error() => Err(err),
        Err(err) => {
            tracing::warn!(error = %err, "homogeneity test could not be computed");
            Ok(DiagnosticResult::inconclusive(
                kind,
                n,
                alpha,
                format!("test could not be computed: {err}"),
            ))
        }
    }
}

/// Run every diagnostic on a design: normality per group or cell and homogeneity
/// of variance across all of them.
pub fn diagnose(
    design: &Design,
    alpha: f64,
    test: NormalityTest,
    center: LeveneCenter,
) -> Result<DesignDiagnostics> {
    let normality = design
        .cells()
        .iter()
        .map(|cell| {
            check_normality_with(cell.observations(), alpha, test).map(|result| CellDiagnostic {
                cell: cell.label().to_string(),
                result,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let groups: Vec<&[f64]> = design.cells().iter().map(|c| c.observations()).collect();
    let homogeneity = check_homogeneity_with(&groups, alpha, center)?;

    for cell in normality.iter().filter(|c| c.result.failed()) {
        tracing::warn!(cell = %cell.cell, p_value = ?cell.result.p_value, "normality rejected");
    }
    if homogeneity.failed() {
        tracing::warn!(p_value = ?homogeneity.p_value, "homogeneity of variance rejected");
    }

    Ok(DesignDiagnostics {
        normality,
        homogeneity,
    })
}

fn to_f64<T>(sample: &[T]) -> Result<Vec<f64>>
where
    T: FloatOps,
{
    sample
        .iter()
        .map(|v| {
            v.to_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| {
                    AnovaError::invalid_design("sample contains a non-finite observation")
                })
        })
        .collect()
}
