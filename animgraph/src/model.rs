use crate::{Error, Transform};
use glam::{Quat, Vec2, Vec3, Vec4};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub bind: Transform,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent: Option<usize>, bind: Transform) -> Self {
        Self {
            name: name.into(),
            parent,
            bind,
        }
    }
}

/// Static skeleton shared by every actor instance that uses it.
#[derive(Clone, Debug)]
pub struct SkeletonData {
    pub name: String,
    pub bones: Vec<BoneData>,
    /// Morph target names per LOD level. Morph indices are LOD-relative.
    pub morph_lods: Vec<Vec<String>>,
    bone_index: HashMap<String, usize>,
}

impl SkeletonData {
    pub fn new(name: impl Into<String>, bones: Vec<BoneData>) -> Result<Self, Error> {
        let mut bone_index = HashMap::with_capacity(bones.len());
        for (index, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    let parent_name = bones
                        .get(parent)
                        .map(|b| b.name.clone())
                        .unwrap_or_else(|| format!("#{parent}"));
                    return Err(Error::UnknownBoneParent {
                        bone: bone.name.clone(),
                        parent: parent_name,
                    });
                }
            }
            bone_index.insert(bone.name.clone(), index);
        }

        Ok(Self {
            name: name.into(),
            bones,
            morph_lods: Vec::new(),
            bone_index,
        })
    }

    /// Appends the morph target list for the next LOD level.
    pub fn with_morph_lod<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.morph_lods
            .push(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bone_index.get(name).copied()
    }

    pub fn num_lod_levels(&self) -> usize {
        self.morph_lods.len().max(1)
    }

    pub fn morph_targets(&self, lod_level: usize) -> &[String] {
        self.morph_lods
            .get(lod_level)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_morph_target(&self, lod_level: usize, name: &str) -> Option<usize> {
        self.morph_targets(lod_level).iter().position(|n| n == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Rotation(Quat),
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Float(_) => "float",
            ParameterValue::Int(_) => "int",
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Vector2(_) => "vector2",
            ParameterValue::Vector3(_) => "vector3",
            ParameterValue::Vector4(_) => "vector4",
            ParameterValue::Rotation(_) => "rotation",
        }
    }

    pub fn same_type(&self, other: &ParameterValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Scalar view used by number ports. Vectors and rotations have none.
    pub fn as_number(&self) -> Option<f32> {
        match *self {
            ParameterValue::Float(v) => Some(v),
            ParameterValue::Int(v) => Some(v as f32),
            ParameterValue::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParameterDef {
    pub name: String,
    pub default: ParameterValue,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, default: ParameterValue) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }

    pub fn float(name: impl Into<String>, default: f32) -> Self {
        Self::new(name, ParameterValue::Float(default))
    }

    pub fn int(name: impl Into<String>, default: i32) -> Self {
        Self::new(name, ParameterValue::Int(default))
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParameterValue::Bool(default))
    }
}
