//! Serde utilities for glam types.

use glam::DVec3;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde proxy for DVec3, written as `[x, y, z]`
#[derive(Serialize, Deserialize)]
pub struct DVec3Def(pub f64, pub f64, pub f64);

impl From<DVec3> for DVec3Def {
    fn from(v: DVec3) -> Self {
        Self(v.x, v.y, v.z)
    }
}

impl From<DVec3Def> for DVec3 {
    fn from(def: DVec3Def) -> Self {
        DVec3::new(def.0, def.1, def.2)
    }
}

pub fn serialize_dvec3<S>(v: &DVec3, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    DVec3Def::from(*v).serialize(s)
}

pub fn deserialize_dvec3<'de, D>(d: D) -> Result<DVec3, D::Error>
where
    D: Deserializer<'de>,
{
    DVec3Def::deserialize(d).map(DVec3::from)
}
