use crate::{SkeletonData, Transform};

/// Full-skeleton set of local transforms plus the morph weights of one LOD level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    transforms: Vec<Transform>,
    morph_weights: Vec<f32>,
    lod_level: usize,
}

impl Pose {
    pub fn bind(skeleton: &SkeletonData, lod_level: usize) -> Self {
        let mut pose = Self::default();
        pose.init_from_bind(skeleton, lod_level);
        pose
    }

    /// Resets to the bind pose, reusing the existing allocations.
    pub fn init_from_bind(&mut self, skeleton: &SkeletonData, lod_level: usize) {
        self.transforms.clear();
        self.transforms
            .extend(skeleton.bones.iter().map(|b| b.bind));
        self.morph_weights.clear();
        self.morph_weights
            .resize(skeleton.morph_targets(lod_level).len(), 0.0);
        self.lod_level = lod_level;
    }

    pub fn num_transforms(&self) -> usize {
        self.transforms.len()
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn local_transform(&self, index: usize) -> Option<&Transform> {
        self.transforms.get(index)
    }

    pub fn local_transform_mut(&mut self, index: usize) -> Option<&mut Transform> {
        self.transforms.get_mut(index)
    }

    pub fn set_local_transform(&mut self, index: usize, transform: Transform) {
        if let Some(t) = self.transforms.get_mut(index) {
            *t = transform;
        }
    }

    pub fn lod_level(&self) -> usize {
        self.lod_level
    }

    pub fn morph_weights(&self) -> &[f32] {
        &self.morph_weights
    }

    pub fn morph_weight(&self, index: usize) -> Option<f32> {
        self.morph_weights.get(index).copied()
    }

    pub fn set_morph_weight(&mut self, index: usize, weight: f32) {
        if let Some(w) = self.morph_weights.get_mut(index) {
            *w = weight;
        }
    }

    pub fn copy_from(&mut self, other: &Pose) {
        self.clone_from(other);
    }

    pub fn blend(&mut self, dest: &Pose, weight: f32) {
        for (t, d) in self.transforms.iter_mut().zip(&dest.transforms) {
            t.blend(d, weight);
        }
        self.blend_morphs(dest, weight);
    }

    /// Adds `dest - reference` on top of this pose. `reference` is usually the bind pose.
    pub fn blend_additive(&mut self, dest: &Pose, reference: &Pose, weight: f32) {
        for ((t, d), r) in self
            .transforms
            .iter_mut()
            .zip(&dest.transforms)
            .zip(&reference.transforms)
        {
            t.blend_additive(d, r, weight);
        }
        for ((w, d), r) in self
            .morph_weights
            .iter_mut()
            .zip(&dest.morph_weights)
            .zip(&reference.morph_weights)
        {
            *w += (d - r) * weight;
        }
    }

    /// Blends only the listed bones. Everything outside `mask` keeps its value.
    pub fn blend_masked(&mut self, dest: &Pose, mask: &[usize], weight: f32) {
        for &bone in mask {
            if let (Some(t), Some(d)) = (self.transforms.get_mut(bone), dest.transforms.get(bone)) {
                t.blend(d, weight);
            }
        }
        self.blend_morphs(dest, weight);
    }

    pub fn blend_additive_masked(
        &mut self,
        dest: &Pose,
        reference: &Pose,
        mask: &[usize],
        weight: f32,
    ) {
        for &bone in mask {
            if let (Some(t), Some(d), Some(r)) = (
                self.transforms.get_mut(bone),
                dest.transforms.get(bone),
                reference.transforms.get(bone),
            ) {
                t.blend_additive(d, r, weight);
            }
        }
    }

    pub fn apply_additive(&mut self, additive: &Pose, weight: f32) {
        for (t, a) in self.transforms.iter_mut().zip(&additive.transforms) {
            t.apply_additive(a, weight);
        }
        for (w, a) in self.morph_weights.iter_mut().zip(&additive.morph_weights) {
            *w += a * weight;
        }
    }

    /// Turns this pose into its difference against `reference`.
    pub fn make_additive(&mut self, reference: &Pose) {
        for (t, r) in self.transforms.iter_mut().zip(&reference.transforms) {
            *t = t.make_additive(r);
        }
        for (w, r) in self.morph_weights.iter_mut().zip(&reference.morph_weights) {
            *w -= r;
        }
    }

    fn blend_morphs(&mut self, dest: &Pose, weight: f32) {
        for (w, d) in self.morph_weights.iter_mut().zip(&dest.morph_weights) {
            *w += (d - *w) * weight;
        }
    }
}
