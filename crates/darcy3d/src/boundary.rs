//! Ghost-node boundary handling.
//!
//! x and y are always periodic. Each z face carries its own rule. The same
//! routine serves scalar, vector and tensor fields.
//!
//! Every ghost cell is written from exactly one interior source cell, and no
//! source is itself a ghost, so a refresh is idempotent. Edge and corner ghosts
//! (where two or three ghost layers meet) are never written: the 7-point
//! stencils used by the solver do not read them.

use serde::{Deserialize, Serialize};

use crate::error::FluidError;
use crate::field::{Field, FieldValue};

/// Boundary condition code of a z face.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BoundaryCondition {
    /// Fixed value
    #[default]
    Dirichlet,
    /// Zero normal gradient
    Neumann,
    /// Wrap to the opposite face
    Periodic,
}

impl BoundaryCondition {
    /// Numeric code used in configuration files.
    pub fn code(self) -> u8 {
        match self {
            Self::Dirichlet => 0,
            Self::Neumann => 1,
            Self::Periodic => 2,
        }
    }
}

impl TryFrom<u8> for BoundaryCondition {
    type Error = FluidError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Dirichlet),
            1 => Ok(Self::Neumann),
            2 => Ok(Self::Periodic),
            other => Err(FluidError::BoundaryCode(other)),
        }
    }
}

impl From<BoundaryCondition> for u8 {
    fn from(bc: BoundaryCondition) -> u8 {
        bc.code()
    }
}

/// How the ghost layer behind one z face is filled.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum GhostRule<T> {
    /// Dirichlet: the ghost holds a fixed boundary value
    Fixed(T),
    /// Neumann: the ghost copies the adjacent interior cell
    ZeroGradient,
    /// Periodic: the ghost copies the interior cell on the opposite face
    Wrap,
}

impl<T> GhostRule<T> {
    /// Rule for a field that carries its own Dirichlet value.
    pub fn from_condition(bc: BoundaryCondition, fixed: T) -> Self {
        match bc {
            BoundaryCondition::Dirichlet => Self::Fixed(fixed),
            BoundaryCondition::Neumann => Self::ZeroGradient,
            BoundaryCondition::Periodic => Self::Wrap,
        }
    }

    /// Rule for auxiliary fields (porosity, stress, ...) that have no boundary
    /// value of their own: mirrored unless the face is periodic.
    pub fn mirrored(bc: BoundaryCondition) -> Self {
        match bc {
            BoundaryCondition::Periodic => Self::Wrap,
            _ => Self::ZeroGradient,
        }
    }
}

/// Pair of rules for the bottom (z = -1) and top (z = nz) ghost layers.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ZFaces<T> {
    pub bottom: GhostRule<T>,
    pub top: GhostRule<T>,
}

impl<T: Copy> ZFaces<T> {
    pub fn new(bottom: GhostRule<T>, top: GhostRule<T>) -> Self {
        Self { bottom, top }
    }

    /// Mirrored rules for both faces.
    pub fn mirrored(bottom: BoundaryCondition, top: BoundaryCondition) -> Self {
        Self::new(GhostRule::mirrored(bottom), GhostRule::mirrored(top))
    }

    /// Fully periodic.
    pub fn periodic() -> Self {
        Self::new(GhostRule::Wrap, GhostRule::Wrap)
    }
}

/// Refresh the ghost halo of a cell-centered field.
pub fn refresh_ghosts<T: FieldValue>(field: &mut Field<T>, faces: ZFaces<T>) {
    let layout = field.layout();
    debug_assert!(!layout.is_staggered(), "face fields carry their own boundaries");
    let (nx, ny, nz) = (layout.nx as i32, layout.ny as i32, layout.nz as i32);

    // x faces (periodic)
    for z in 0..nz {
        for y in 0..ny {
            let lo = field.at(0, y, z);
            let hi = field.at(nx - 1, y, z);
            field.set(-1, y, z, hi);
            field.set(nx, y, z, lo);
        }
    }

    // y faces (periodic)
    for z in 0..nz {
        for x in 0..nx {
            let lo = field.at(x, 0, z);
            let hi = field.at(x, ny - 1, z);
            field.set(x, -1, z, hi);
            field.set(x, ny, z, lo);
        }
    }

    // z faces
    for y in 0..ny {
        for x in 0..nx {
            let bottom = match faces.bottom {
                GhostRule::Fixed(v) => v,
                GhostRule::ZeroGradient => field.at(x, y, 0),
                GhostRule::Wrap => field.at(x, y, nz - 1),
            };
            let top = match faces.top {
                GhostRule::Fixed(v) => v,
                GhostRule::ZeroGradient => field.at(x, y, nz - 1),
                GhostRule::Wrap => field.at(x, y, 0),
            };
            field.set(x, y, -1, bottom);
            field.set(x, y, nz, top);
        }
    }
}
