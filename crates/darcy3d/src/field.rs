//! Ghost-padded field storage.
//!
//! A [`Field`] owns one value per lattice node, ghosts included. Scalar,
//! vector and symmetric tensor fields share the same storage and the same
//! boundary handling; only the value type differs.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use glam::DVec3;
use rayon::prelude::*;

use crate::error::{FluidError, FluidResult};
use crate::grid::{Grid3D, Layout};

/// A value that can be stored in a field.
pub trait FieldValue: Copy + Default + Send + Sync + fmt::Debug + 'static {
    /// Number of scalar components (1, 3 or 6).
    const ARITY: usize;

    /// Scalar components in storage order.
    fn components(&self) -> [f64; 6];

    /// True when every component is finite.
    fn is_finite(&self) -> bool {
        self.components()[..Self::ARITY].iter().all(|&c| c.is_finite())
    }
}

impl FieldValue for f64 {
    const ARITY: usize = 1;

    #[inline]
    fn components(&self) -> [f64; 6] {
        [*self, 0.0, 0.0, 0.0, 0.0, 0.0]
    }
}

impl FieldValue for DVec3 {
    const ARITY: usize = 3;

    #[inline]
    fn components(&self) -> [f64; 6] {
        [self.x, self.y, self.z, 0.0, 0.0, 0.0]
    }
}

/// Symmetric 3x3 tensor stored as its upper triangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SymTensor {
    pub xx: f64,
    pub xy: f64,
    pub xz: f64,
    pub yy: f64,
    pub yz: f64,
    pub zz: f64,
}

impl SymTensor {
    pub const ZERO: Self = Self {
        xx: 0.0,
        xy: 0.0,
        xz: 0.0,
        yy: 0.0,
        yz: 0.0,
        zz: 0.0,
    };

    /// Row `i` of the full matrix.
    #[inline]
    pub fn row(&self, i: usize) -> DVec3 {
        match i {
            0 => DVec3::new(self.xx, self.xy, self.xz),
            1 => DVec3::new(self.xy, self.yy, self.yz),
            _ => DVec3::new(self.xz, self.yz, self.zz),
        }
    }

    /// Sum of the diagonal.
    #[inline]
    pub fn trace(&self) -> f64 {
        self.xx + self.yy + self.zz
    }
}

impl Add for SymTensor {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            xx: self.xx + o.xx,
            xy: self.xy + o.xy,
            xz: self.xz + o.xz,
            yy: self.yy + o.yy,
            yz: self.yz + o.yz,
            zz: self.zz + o.zz,
        }
    }
}

impl Sub for SymTensor {
    type Output = Self;

    fn sub(self, o: Self) -> Self {
        Self {
            xx: self.xx - o.xx,
            xy: self.xy - o.xy,
            xz: self.xz - o.xz,
            yy: self.yy - o.yy,
            yz: self.yz - o.yz,
            zz: self.zz - o.zz,
        }
    }
}

impl Mul<f64> for SymTensor {
    type Output = Self;

    fn mul(self, s: f64) -> Self {
        Self {
            xx: self.xx * s,
            xy: self.xy * s,
            xz: self.xz * s,
            yy: self.yy * s,
            yz: self.yz * s,
            zz: self.zz * s,
        }
    }
}

impl FieldValue for SymTensor {
    const ARITY: usize = 6;

    #[inline]
    fn components(&self) -> [f64; 6] {
        [self.xx, self.xy, self.xz, self.yy, self.yz, self.zz]
    }
}

/// Ghost-padded lattice field.
#[derive(Clone, Debug)]
pub struct Field<T> {
    name: &'static str,
    layout: Layout,
    data: Vec<T>,
}

/// One scalar per cell.
pub type ScalarField = Field<f64>;
/// One vector per cell.
pub type VectorField = Field<DVec3>;
/// One symmetric tensor per cell.
pub type TensorField = Field<SymTensor>;

impl<T: FieldValue> Field<T> {
    /// Allocate a cell-centered field filled with `fill`.
    pub fn cell_centered(name: &'static str, grid: &Grid3D, fill: T) -> FluidResult<Self> {
        Self::allocate(name, grid.cell_layout(), fill)
    }

    /// Allocate a congruently padded face field filled with `fill`.
    pub fn face_centered(name: &'static str, grid: &Grid3D, fill: T) -> FluidResult<Self> {
        Self::allocate(name, grid.face_layout(), fill)
    }

    fn allocate(name: &'static str, layout: Layout, fill: T) -> FluidResult<Self> {
        let cells = layout.len();
        let mut data = Vec::new();
        data.try_reserve_exact(cells)
            .map_err(|_| FluidError::Allocation { field: name, cells })?;
        data.resize(cells, fill);
        Ok(Self { name, layout, data })
    }

    /// Field name used in diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Storage layout.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Total stored values, ghosts included.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at `(x, y, z)`; ghosts are addressable.
    #[inline]
    pub fn at(&self, x: i32, y: i32, z: i32) -> T {
        self.data[self.layout.index(x, y, z)]
    }

    /// Overwrite the value at `(x, y, z)`.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, z: i32, value: T) {
        let idx = self.layout.index(x, y, z);
        self.data[idx] = value;
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Set every value, ghosts included.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy all values (ghosts included) from a field of the same layout.
    pub fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.layout, other.layout);
        self.data.copy_from_slice(&other.data);
    }

    /// Recompute every interior cell in parallel from a read-only stencil.
    ///
    /// Ghost cells are left untouched. `f` must not depend on this field's own
    /// values (it cannot borrow them), which makes each call a barrier phase.
    pub fn par_update_interior<F>(&mut self, f: F)
    where
        F: Fn(i32, i32, i32) -> T + Sync + Send,
    {
        let layout = self.layout;
        self.data.par_iter_mut().enumerate().for_each(|(idx, out)| {
            let (x, y, z) = layout.coords(idx);
            if layout.is_interior(x, y, z) {
                *out = f(x, y, z);
            }
        });
    }

    /// Find the first interior cell holding a non-finite value.
    pub fn find_non_finite(&self) -> Option<(i32, i32, i32)> {
        let layout = self.layout;
        self.data
            .par_iter()
            .enumerate()
            .filter(|(idx, v)| {
                let (x, y, z) = layout.coords(*idx);
                layout.is_interior(x, y, z) && !v.is_finite()
            })
            .map(|(idx, _)| idx)
            .min()
            .map(|idx| layout.coords(idx))
    }

    /// Error out if any interior value is NaN or infinite.
    pub fn ensure_finite(&self, time: f64) -> FluidResult<()> {
        match self.find_non_finite() {
            Some(cell) => Err(FluidError::non_finite(self.name, cell, time)),
            None => Ok(()),
        }
    }
}

impl ScalarField {
    /// Central-difference gradient at an interior cell.
    #[inline]
    pub fn gradient(&self, grid: &Grid3D, x: i32, y: i32, z: i32) -> DVec3 {
        DVec3::new(
            (self.at(x + 1, y, z) - self.at(x - 1, y, z)) / (2.0 * grid.dx),
            (self.at(x, y + 1, z) - self.at(x, y - 1, z)) / (2.0 * grid.dy),
            (self.at(x, y, z + 1) - self.at(x, y, z - 1)) / (2.0 * grid.dz),
        )
    }

    /// Interior mean.
    pub fn interior_mean(&self, grid: &Grid3D) -> f64 {
        let sum: f64 = grid
            .interior_cells()
            .map(|(x, y, z)| self.at(x, y, z))
            .sum();
        sum / grid.interior_count() as f64
    }
}

impl VectorField {
    /// Central-difference divergence at an interior cell.
    #[inline]
    pub fn divergence(&self, grid: &Grid3D, x: i32, y: i32, z: i32) -> f64 {
        (self.at(x + 1, y, z).x - self.at(x - 1, y, z).x) / (2.0 * grid.dx)
            + (self.at(x, y + 1, z).y - self.at(x, y - 1, z).y) / (2.0 * grid.dy)
            + (self.at(x, y, z + 1).z - self.at(x, y, z - 1).z) / (2.0 * grid.dz)
    }

    /// Largest interior velocity magnitude.
    pub fn interior_max_length(&self, grid: &Grid3D) -> f64 {
        grid.interior_cells()
            .map(|(x, y, z)| self.at(x, y, z).length())
            .fold(0.0, f64::max)
    }
}
