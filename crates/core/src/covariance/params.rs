use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{CovError, Result};
use crate::types::DenseMatrix;

/// A named block of free parameters. Scalars are stored as 1x1 and vectors as nx1.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: DenseMatrix,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: DenseMatrix) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, DMatrix::from_element(1, 1, value))
    }

    pub fn vector(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, DMatrix::from_column_slice(values.len(), 1, values))
    }

    /// Number of scalar entries.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.value.shape()
    }
}

/// Check that `given` has the same names and shapes as `expected`.
pub(crate) fn check_parameters(context: &str, expected: &[Parameter], given: &[Parameter]) -> Result<()> {
    if expected.len() != given.len() {
        return Err(CovError::InvalidParameter(format!(
            "{context} expects {} parameter blocks, got {}",
            expected.len(),
            given.len()
        )));
    }
    for (e, g) in expected.iter().zip(given) {
        if e.name != g.name {
            return Err(CovError::InvalidParameter(format!(
                "{context}: expected parameter '{}', got '{}'",
                e.name, g.name
            )));
        }
        if e.shape() != g.shape() {
            return Err(CovError::InvalidParameter(format!(
                "{context}: parameter '{}' has shape {:?}, expected {:?}",
                g.name,
                g.shape(),
                e.shape()
            )));
        }
    }
    Ok(())
}

/// Matrix of independent standard normal draws, used for random initialization.
pub(crate) fn standard_normal(rows: usize, cols: usize, rng: &mut impl Rng) -> DenseMatrix {
    DMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
}

/// Location of one parameter block inside the flat optimizer vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBlock {
    pub group: usize,
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub offset: usize,
}

impl ParameterBlock {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry mapping an ordered list of parameter groups onto one flat vector.
///
/// Each group is typically one covariance object's [`parameters`] (or a
/// model-level block). Blocks are laid out in registration order, each
/// flattened column-major, so packing is a bit-exact copy and
/// `unpack(pack(p)) == p`.
///
/// [`parameters`]: super::Covariance::parameters
#[derive(Debug, Clone, Default)]
pub struct ParameterLayout {
    groups: Vec<String>,
    blocks: Vec<ParameterBlock>,
    len: usize,
}

impl ParameterLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group; its blocks follow every previously registered block.
    pub fn register(&mut self, group: impl Into<String>, params: &[Parameter]) -> usize {
        let index = self.groups.len();
        self.groups.push(group.into());
        for p in params {
            let (rows, cols) = p.shape();
            self.blocks.push(ParameterBlock {
                group: index,
                name: p.name.clone(),
                rows,
                cols,
                offset: self.len,
            });
            self.len += rows * cols;
        }
        index
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_group(mut self, group: impl Into<String>, params: &[Parameter]) -> Self {
        self.register(group, params);
        self
    }

    /// Total length of the flat vector.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn group_name(&self, group: usize) -> Option<&str> {
        self.groups.get(group).map(String::as_str)
    }

    pub fn blocks(&self) -> &[ParameterBlock] {
        &self.blocks
    }

    pub fn group_blocks(&self, group: usize) -> impl Iterator<Item = &ParameterBlock> {
        self.blocks.iter().filter(move |b| b.group == group)
    }

    /// Flatten every group's parameters into one vector.
    pub fn pack(&self, groups: &[Vec<Parameter>]) -> Result<Vec<f64>> {
        if groups.len() != self.groups.len() {
            return Err(CovError::dim(
                self.groups.len(),
                groups.len(),
                "parameter groups to pack",
            ));
        }
        let mut flat = Vec::with_capacity(self.len);
        for (g, params) in groups.iter().enumerate() {
            let blocks: Vec<&ParameterBlock> = self.group_blocks(g).collect();
            if blocks.len() != params.len() {
                return Err(CovError::InvalidParameter(format!(
                    "group '{}' has {} blocks registered, got {}",
                    self.groups[g],
                    blocks.len(),
                    params.len()
                )));
            }
            for (block, p) in blocks.iter().zip(params) {
                if (block.rows, block.cols) != p.shape() {
                    return Err(CovError::InvalidParameter(format!(
                        "block '{}' of group '{}' has shape {:?}, registered as {:?}",
                        p.name,
                        self.groups[g],
                        p.shape(),
                        (block.rows, block.cols)
                    )));
                }
                flat.extend_from_slice(p.value.as_slice());
            }
        }
        Ok(flat)
    }

    /// Split a flat vector back into per-group parameter lists.
    pub fn unpack(&self, flat: &[f64]) -> Result<Vec<Vec<Parameter>>> {
        if flat.len() != self.len {
            return Err(CovError::dim(self.len, flat.len(), "flat parameter vector"));
        }
        let mut groups: Vec<Vec<Parameter>> = vec![Vec::new(); self.groups.len()];
        for block in &self.blocks {
            let values = &flat[block.offset..block.offset + block.len()];
            groups[block.group].push(Parameter::new(
                block.name.clone(),
                DMatrix::from_column_slice(block.rows, block.cols, values),
            ));
        }
        Ok(groups)
    }
}
