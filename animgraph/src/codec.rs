//! Little-endian codec used to snapshot per-instance node state into the recorder's frame buffer.

use crate::{Error, Transform};
use byteorder::{ByteOrder, LittleEndian};
use glam::{Quat, Vec3};

/// Writes into a bounded slice, or only counts bytes when created with [`ByteWriter::counting`].
/// Both modes advance the cursor identically, so a counting pass yields the exact size of a real
/// write.
pub struct ByteWriter<'a> {
    out: Option<&'a mut [u8]>,
    cursor: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn counting() -> Self {
        Self {
            out: None,
            cursor: 0,
        }
    }

    pub fn new(out: &'a mut [u8]) -> Self {
        Self {
            out: Some(out),
            cursor: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_counting(&self) -> bool {
        self.out.is_none()
    }

    fn slot(&mut self, len: usize) -> Result<Option<&mut [u8]>, Error> {
        let start = self.cursor;
        self.cursor += len;
        match self.out.as_deref_mut() {
            None => Ok(None),
            Some(out) => {
                let capacity = out.len();
                out.get_mut(start..start + len)
                    .map(Some)
                    .ok_or(Error::ByteCountMismatch {
                        expected: capacity,
                        actual: start + len,
                    })
            }
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        if let Some(dst) = self.slot(1)? {
            dst[0] = value;
        }
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.write_u8(u8::from(value))
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        if let Some(dst) = self.slot(4)? {
            LittleEndian::write_u32(dst, value);
        }
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        if let Some(dst) = self.slot(4)? {
            LittleEndian::write_i32(dst, value);
        }
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        if let Some(dst) = self.slot(4)? {
            LittleEndian::write_f32(dst, value);
        }
        Ok(())
    }

    pub fn write_vec3(&mut self, value: Vec3) -> Result<(), Error> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)
    }

    pub fn write_quat(&mut self, value: Quat) -> Result<(), Error> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)?;
        self.write_f32(value.w)
    }

    pub fn write_transform(&mut self, value: &Transform) -> Result<(), Error> {
        self.write_vec3(value.position)?;
        self.write_quat(value.rotation)?;
        self.write_vec3(value.scale)
    }

    /// `None` is stored as `-1`.
    pub fn write_index(&mut self, value: Option<usize>) -> Result<(), Error> {
        let raw = match value {
            Some(v) => i32::try_from(v).map_err(|_| Error::InvalidValue {
                message: format!("index {v} does not fit the unique data format"),
            })?,
            None => -1,
        };
        self.write_i32(raw)
    }
}

pub struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::UniqueDataDecode {
                message: "unexpected end of data".to_string(),
            });
        }
        let bytes = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, Error> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_quat(&mut self) -> Result<Quat, Error> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_transform(&mut self) -> Result<Transform, Error> {
        Ok(Transform {
            position: self.read_vec3()?,
            rotation: self.read_quat()?,
            scale: self.read_vec3()?,
        })
    }

    pub fn read_index(&mut self) -> Result<Option<usize>, Error> {
        let raw = self.read_i32()?;
        Ok(usize::try_from(raw).ok())
    }
}
