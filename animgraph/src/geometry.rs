use glam::{Quat, Vec3};

/// Local-space bone or actor transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// The neutral element for [`Transform::apply_additive`].
    pub const ZERO_ADDITIVE: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ZERO,
    };

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Interpolates towards `dest`. Rotation uses a normalized lerp along the shortest arc.
    pub fn blend(&mut self, dest: &Transform, weight: f32) {
        self.position = self.position.lerp(dest.position, weight);
        self.rotation = self.rotation.lerp(dest.rotation, weight).normalize();
        self.scale = self.scale.lerp(dest.scale, weight);
    }

    /// Adds the difference between `dest` and `reference`, scaled by `weight`.
    pub fn blend_additive(&mut self, dest: &Transform, reference: &Transform, weight: f32) {
        self.position += (dest.position - reference.position) * weight;
        let delta = reference.rotation.conjugate() * dest.rotation;
        self.rotation = self
            .rotation
            .lerp(self.rotation * delta, weight)
            .normalize();
        self.scale += (dest.scale - reference.scale) * weight;
    }

    /// Applies a transform produced by [`Transform::make_additive`].
    pub fn apply_additive(&mut self, additive: &Transform, weight: f32) {
        self.position += additive.position * weight;
        self.rotation = self
            .rotation
            .lerp(self.rotation * additive.rotation, weight)
            .normalize();
        self.scale += additive.scale * weight;
    }

    pub fn make_additive(&self, reference: &Transform) -> Transform {
        Transform {
            position: self.position - reference.position,
            rotation: (reference.rotation.conjugate() * self.rotation).normalize(),
            scale: self.scale - reference.scale,
        }
    }

    /// Composes `self` (parent) with `child`, ignoring non-uniform scale shear.
    pub fn multiply(&self, child: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale * child.position),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }

    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.conjugate();
        let scale = self.scale.recip();
        Transform {
            position: rotation * (-self.position) * scale,
            rotation,
            scale,
        }
    }

    pub fn is_close(&self, other: &Transform, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && self.rotation.abs_diff_eq(other.rotation, epsilon)
            && self.scale.abs_diff_eq(other.scale, epsilon)
    }
}
