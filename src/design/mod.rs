//! Grouped observations under one or two categorical factors.
//!
//! A [`Design`] is built once per dataset with [`build_one_way`] or
//! [`build_two_way`], validated at construction and immutable afterwards. It holds
//! the observations of every group (one-way) or cell (two-way) together with the
//! derived quantities the rest of the engine consumes: grand mean, per-cell means
//! and sizes, N and the level counts.
//!
//! The grand mean is weighted by observation count, not by group, so unbalanced
//! designs are handled correctly.

use ndarray::Array2;
use num_traits::Float;
use single_utilities::traits::FloatOps;
use std::collections::HashMap;

use crate::error::{AnovaError, Result};

pub mod moments;

use moments::{Moments, compensated_sum};

/// Number of factors in a design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DesignKind {
    OneWay,
    TwoWay,
}

/// A categorical variable with an ordered set of distinct levels.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Factor {
    name: String,
    levels: Vec<String>,
}

impl Factor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

/// Observations sharing one factor level (one-way) or one level pair (two-way).
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    levels: Vec<usize>,
    label: String,
    observations: Vec<f64>,
    /// Shift shared by every cell of the design.
    origin: f64,
    /// Moments of `observations - origin`.
    moments: Moments,
}

impl Cell {
    /// Level indices of this cell, one per factor.
    pub fn level_indices(&self) -> &[usize] {
        &self.levels
    }

    /// Human-readable cell name, `level` or `levelA:levelB`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn observations(&self) -> &[f64] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.origin + self.moments.mean()
    }

    /// Sum of squared deviations from the cell mean.
    pub fn sum_of_squares(&self) -> f64 {
        self.moments.sum_of_squares()
    }

    /// Sample variance; `None` for a single observation.
    pub fn variance(&self) -> Option<f64> {
        self.moments.variance()
    }

    /// Cell mean relative to the design origin.
    pub(crate) fn centred_mean(&self) -> f64 {
        self.moments.mean()
    }
}

/// Count and weighted mean of one level of a factor, pooled over the other factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marginal {
    pub count: usize,
    pub mean: f64,
}

/// A validated, immutable one-way or fully crossed two-way design.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    kind: DesignKind,
    factors: Vec<Factor>,
    /// Row-major over factor levels: cell `(i, j)` lives at `i * b + j`.
    cells: Vec<Cell>,
    /// Mean of the raw observations, up to rounding; every cell is centred on it.
    origin: f64,
    /// Exact grand mean relative to `origin`.
    centred_grand_mean: f64,
    num_observations: usize,
}

/// Build a one-way design from `(level, observations)` pairs.
///
/// Levels keep the order in which they are supplied. Fails with
/// [`AnovaError::InvalidDesign`] if fewer than two levels are given, a level is
/// repeated, a group is empty or an observation is not finite.
///
/// # Example
///
/// ```
/// use anova_engine::design::build_one_way;
///
/// let design = build_one_way(vec![
///     ("G1", vec![2.0, 3.0, 4.0]),
///     ("G2", vec![5.0, 6.0, 7.0]),
///     ("G3", vec![8.0, 9.0, 10.0]),
/// ])
/// .unwrap();
///
/// assert_eq!(design.num_observations(), 9);
/// assert_eq!(design.grand_mean(), 6.0);
/// ```
pub fn build_one_way<L, S, T>(groups: impl IntoIterator<Item = (L, S)>) -> Result<Design>
where
    L: ToString,
    S: AsRef<[T]>,
    T: FloatOps,
{
    let mut levels: Vec<String> = Vec::new();
    let mut cells: Vec<Cell> = Vec::new();

    for (level, values) in groups {
        let level = level.to_string();
        if levels.contains(&level) {
            return Err(AnovaError::invalid_design(format!(
                "level '{level}' is supplied more than once"
            )));
        }
        let observations = convert_observations(values.as_ref(), &level)?;
        if observations.is_empty() {
            return Err(AnovaError::invalid_design(format!(
                "group '{level}' has no observations"
            )));
        }
        cells.push(Cell::new(vec![levels.len()], level.clone(), observations));
        levels.push(level);
    }

    if levels.len() < 2 {
        return Err(AnovaError::invalid_design(format!(
            "a factor needs at least 2 levels, got {}",
            levels.len()
        )));
    }

    Ok(Design::from_cells(
        DesignKind::OneWay,
        vec![Factor {
            name: "A".to_string(),
            levels,
        }],
        cells,
    ))
}

/// Build a fully crossed two-way design from `((levelA, levelB), observations)` pairs.
///
/// Levels of each factor keep their order of first appearance. Every
/// `levelA × levelB` combination must be present and non-empty; a design with a
/// missing or empty cell, a repeated cell, a factor with fewer than two levels or
/// a non-finite observation fails with [`AnovaError::InvalidDesign`].
pub fn build_two_way<A, B, S, T>(cells: impl IntoIterator<Item = ((A, B), S)>) -> Result<Design>
where
    A: ToString,
    B: ToString,
    S: AsRef<[T]>,
    T: FloatOps,
{
    let mut levels_a: Vec<String> = Vec::new();
    let mut levels_b: Vec<String> = Vec::new();
    let mut supplied: HashMap<(usize, usize), Vec<f64>> = HashMap::new();

    for ((level_a, level_b), values) in cells {
        let level_a = level_a.to_string();
        let level_b = level_b.to_string();
        let i = level_index(&mut levels_a, &level_a);
        let j = level_index(&mut levels_b, &level_b);
        let label = format!("{level_a}:{level_b}");

        let observations = convert_observations(values.as_ref(), &label)?;
        if observations.is_empty() {
            return Err(AnovaError::invalid_design(format!(
                "cell '{label}' has no observations"
            )));
        }
        if supplied.insert((i, j), observations).is_some() {
            return Err(AnovaError::invalid_design(format!(
                "cell '{label}' is supplied more than once"
            )));
        }
    }

    for (factor, levels) in [("A", &levels_a), ("B", &levels_b)] {
        if levels.len() < 2 {
            return Err(AnovaError::invalid_design(format!(
                "factor {factor} needs at least 2 levels, got {}",
                levels.len()
            )));
        }
    }

    let missing: Vec<String> = (0..levels_a.len())
        .flat_map(|i| (0..levels_b.len()).map(move |j| (i, j)))
        .filter(|key| !supplied.contains_key(key))
        .map(|(i, j)| format!("{}:{}", levels_a[i], levels_b[j]))
        .collect();
    if !missing.is_empty() {
        return Err(AnovaError::invalid_design(format!(
            "factors are not fully crossed, missing cells: {}",
            missing.join(", ")
        )));
    }

    let mut ordered = Vec::with_capacity(levels_a.len() * levels_b.len());
    for (i, level_a) in levels_a.iter().enumerate() {
        for (j, level_b) in levels_b.iter().enumerate() {
            let observations = supplied.remove(&(i, j)).unwrap_or_default();
            ordered.push(Cell::new(
                vec![i, j],
                format!("{level_a}:{level_b}"),
                observations,
            ));
        }
    }

    Ok(Design::from_cells(
        DesignKind::TwoWay,
        vec![
            Factor {
                name: "A".to_string(),
                levels: levels_a,
            },
            Factor {
                name: "B".to_string(),
                levels: levels_b,
            },
        ],
        ordered,
    ))
}

fn level_index(levels: &mut Vec<String>, level: &str) -> usize {
    match levels.iter().position(|l| l == level) {
        Some(idx) => idx,
        None => {
            levels.push(level.to_string());
            levels.len() - 1
        }
    }
}

fn convert_observations<T>(values: &[T], label: &str) -> Result<Vec<f64>>
where
    T: FloatOps,
{
    values
        .iter()
        .map(|&value| {
            if !Float::is_finite(value) {
                return Err(AnovaError::invalid_design(format!(
                    "'{label}' contains a non-finite observation"
                )));
            }
            value.to_f64().ok_or_else(|| {
                AnovaError::invalid_design(format!(
                    "'{label}' contains an observation not representable as f64"
                ))
            })
        })
        .collect()
}

impl Cell {
    fn new(levels: Vec<usize>, label: String, observations: Vec<f64>) -> Self {
        Cell {
            levels,
            label,
            observations,
            origin: 0.0,
            moments: Moments::new(),
        }
    }

    fn centre_at(&mut self, origin: f64) {
        self.origin = origin;
        self.moments = Moments::about(&self.observations, origin);
    }
}

impl Design {
    fn from_cells(kind: DesignKind, factors: Vec<Factor>, mut cells: Vec<Cell>) -> Self {
        let num_observations: usize = cells.iter().map(Cell::len).sum();
        let origin = compensated_sum(cells.iter().flat_map(|c| c.observations.iter().copied()))
            / num_observations as f64;
        for cell in &mut cells {
            cell.centre_at(origin);
        }
        let pooled = cells
            .iter()
            .fold(Moments::new(), |acc, cell| acc.merge(&cell.moments));
        Design {
            kind,
            factors,
            cells,
            origin,
            centred_grand_mean: pooled.mean(),
            num_observations,
        }
    }

    /// Return the same design with its factors renamed.
    ///
    /// Names appear in effect labels and report interpretations. The number of
    /// names must equal the number of factors.
    pub fn with_factor_names<N: ToString>(mut self, names: &[N]) -> Result<Self> {
        if names.len() != self.factors.len() {
            return Err(AnovaError::invalid_design(format!(
                "expected {} factor names, got {}",
                self.factors.len(),
                names.len()
            )));
        }
        let names: Vec<String> = names.iter().map(ToString::to_string).collect();
        if names.len() == 2 && names[0] == names[1] {
            return Err(AnovaError::invalid_design(format!(
                "factor names must be distinct, got '{}' twice",
                names[0]
            )));
        }
        for (factor, name) in self.factors.iter_mut().zip(names) {
            factor.name = name;
        }
        Ok(self)
    }

    pub fn kind(&self) -> DesignKind {
        self.kind
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn factor(&self, index: usize) -> Option<&Factor> {
        self.factors.get(index)
    }

    /// All groups (one-way) or cells (two-way, row-major over factor A then B).
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell at level indices `(i, j)` of a two-way design.
    pub fn cell(&self, i: usize, j: usize) -> Option<&Cell> {
        if self.kind != DesignKind::TwoWay {
            return None;
        }
        let b = self.factors[1].num_levels();
        if i >= self.factors[0].num_levels() || j >= b {
            return None;
        }
        self.cells.get(i * b + j)
    }

    /// Count-weighted mean of all observations.
    pub fn grand_mean(&self) -> f64 {
        self.origin + self.centred_grand_mean
    }

    /// Shift subtracted from every observation before sums of squares are taken.
    pub(crate) fn origin(&self) -> f64 {
        self.origin
    }

    /// Grand mean relative to [`Design::origin`].
    pub(crate) fn centred_grand_mean(&self) -> f64 {
        self.centred_grand_mean
    }

    /// Total number of observations, N.
    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// Number of groups (k) or cells (a × b).
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_means(&self) -> Vec<f64> {
        self.cells.iter().map(Cell::mean).collect()
    }

    pub fn cell_sizes(&self) -> Vec<usize> {
        self.cells.iter().map(Cell::len).collect()
    }

    /// Every observation of the design, cell by cell.
    pub fn observations(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells
            .iter()
            .flat_map(|cell| cell.observations().iter().copied())
    }

    /// Whether all groups or cells have the same size.
    pub fn is_balanced(&self) -> bool {
        self.cells
            .windows(2)
            .all(|pair| pair[0].len() == pair[1].len())
    }

    /// Counts and weighted means of each level of `factor`, pooled over the
    /// other factor.
    pub fn marginals(&self, factor: usize) -> Vec<Marginal> {
        self.centred_marginals(factor)
            .into_iter()
            .map(|m| Marginal {
                count: m.count,
                mean: self.origin + m.mean,
            })
            .collect()
    }

    /// Marginals with means relative to [`Design::origin`].
    pub(crate) fn centred_marginals(&self, factor: usize) -> Vec<Marginal> {
        let Some(levels) = self.factors.get(factor).map(Factor::num_levels) else {
            return Vec::new();
        };
        let mut pooled = vec![Moments::new(); levels];
        for cell in &self.cells {
            let level = cell.level_indices()[factor];
            pooled[level] = pooled[level].merge(&cell.moments);
        }
        pooled
            .into_iter()
            .map(|m| Marginal {
                count: m.count(),
                mean: m.mean(),
            })
            .collect()
    }

    /// `a × b` matrices of cell means, relative to [`Design::origin`], and cell
    /// sizes of a two-way design.
    pub(crate) fn cell_matrices(&self) -> Option<(Array2<f64>, Array2<f64>)> {
        if self.kind != DesignKind::TwoWay {
            return None;
        }
        let shape = (self.factors[0].num_levels(), self.factors[1].num_levels());
        let means = Array2::from_shape_vec(
            shape,
            self.cells.iter().map(Cell::centred_mean).collect(),
        )
        .ok()?;
        let sizes = Array2::from_shape_vec(
            shape,
            self.cells.iter().map(|c| c.len() as f64).collect(),
        )
        .ok()?;
        Some((means, sizes))
    }
}
