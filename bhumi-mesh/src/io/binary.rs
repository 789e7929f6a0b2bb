//! Little-endian binary primitives shared by all snapshot formats.
//!
//! Every snapshot starts with a 4-byte magic and a version byte, followed by
//! length-prefixed sections written with [`BinWriter`].

use std::io::{Read, Write};

use crate::error::{NavmeshError, Result};
use crate::flags::MovementFlags;
use crate::geometry::{Aabb, Vec3};

/// Writes primitives in little-endian order.
pub struct BinWriter<'a, W: Write> {
    inner: &'a mut W,
}

impl<'a, W: Write> BinWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner }
    }

    /// Magic and version header.
    pub fn header(&mut self, magic: &[u8; 4], version: u8) -> Result<()> {
        self.inner.write_all(magic)?;
        self.u8(version)
    }

    pub fn u8(&mut self, v: u8) -> Result<()> {
        self.inner.write_all(&[v])?;
        Ok(())
    }

    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.u8(v as u8)
    }

    pub fn u32(&mut self, v: u32) -> Result<()> {
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    pub fn u64(&mut self, v: u64) -> Result<()> {
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    pub fn f32(&mut self, v: f32) -> Result<()> {
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// Collection length (u32).
    pub fn len(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n).map_err(|_| NavmeshError::InvalidSnapshot(format!("collection too large: {}", n)))?;
        self.u32(n)
    }

    pub fn flags(&mut self, v: MovementFlags) -> Result<()> {
        self.u8(v.bits())
    }

    pub fn vec3(&mut self, v: Vec3) -> Result<()> {
        self.f32(v.x)?;
        self.f32(v.y)?;
        self.f32(v.z)
    }

    pub fn aabb(&mut self, v: &Aabb) -> Result<()> {
        self.vec3(v.min)?;
        self.vec3(v.max)
    }

    /// Length-prefixed u32 list.
    pub fn ids(&mut self, ids: &[u32]) -> Result<()> {
        self.len(ids.len())?;
        for &id in ids {
            self.u32(id)?;
        }
        Ok(())
    }

    pub fn option_vec3(&mut self, v: Option<Vec3>) -> Result<()> {
        match v {
            Some(p) => {
                self.bool(true)?;
                self.vec3(p)
            }
            None => self.bool(false),
        }
    }
}

/// Reads primitives written by [`BinWriter`].
pub struct BinReader<'a, R: Read> {
    inner: &'a mut R,
}

/// Upper bound on any length prefix, guards against corrupt input.
const MAX_LEN: u32 = 64 * 1024 * 1024;

impl<'a, R: Read> BinReader<'a, R> {
    pub fn new(inner: &'a mut R) -> Self {
        Self { inner }
    }

    /// Check magic and version.
    pub fn header(&mut self, magic: &[u8; 4], version: u8) -> Result<()> {
        let mut found = [0u8; 4];
        self.inner.read_exact(&mut found)?;
        if &found != magic {
            return Err(NavmeshError::InvalidSnapshot(format!(
                "bad magic {:?}, expected {:?}",
                found, magic
            )));
        }
        let found_version = self.u8()?;
        if found_version != version {
            return Err(NavmeshError::VersionMismatch {
                expected: version,
                found: found_version,
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(NavmeshError::InvalidSnapshot(format!("invalid bool byte {}", v))),
        }
    }

    pub fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    pub fn len(&mut self) -> Result<usize> {
        let n = self.u32()?;
        if n > MAX_LEN {
            return Err(NavmeshError::InvalidSnapshot(format!("length {} out of range", n)));
        }
        Ok(n as usize)
    }

    pub fn flags(&mut self) -> Result<MovementFlags> {
        Ok(MovementFlags(self.u8()?))
    }

    pub fn vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    pub fn aabb(&mut self) -> Result<Aabb> {
        let min = self.vec3()?;
        let max = self.vec3()?;
        Ok(Aabb { min, max })
    }

    pub fn ids(&mut self) -> Result<Vec<u32>> {
        let n = self.len()?;
        let mut ids = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            ids.push(self.u32()?);
        }
        Ok(ids)
    }

    pub fn option_vec3(&mut self) -> Result<Option<Vec3>> {
        if self.bool()? { Ok(Some(self.vec3()?)) } else { Ok(None) }
    }
}
