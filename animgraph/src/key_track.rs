use glam::{Quat, Vec3};

/// A value that can live in a [`KeyTrack`].
pub trait KeyValue: Copy + std::fmt::Debug {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
    fn is_close(a: Self, b: Self, epsilon: f32) -> bool;
}

impl KeyValue for f32 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }

    fn is_close(a: Self, b: Self, epsilon: f32) -> bool {
        (a - b).abs() <= epsilon
    }
}

impl KeyValue for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }

    fn is_close(a: Self, b: Self, epsilon: f32) -> bool {
        a.abs_diff_eq(b, epsilon)
    }
}

impl KeyValue for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t).normalize()
    }

    fn is_close(a: Self, b: Self, epsilon: f32) -> bool {
        a.abs_diff_eq(b, epsilon)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
}

/// Linearly interpolated keyframe track, sorted by time.
#[derive(Clone, Debug)]
pub struct KeyTrack<T> {
    keys: Vec<Key<T>>,
}

impl<T> Default for KeyTrack<T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<T: KeyValue> KeyTrack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
        }
    }

    pub fn from_keys(mut keys: Vec<Key<T>>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn keys(&self) -> &[Key<T>] {
        &self.keys
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn first_key(&self) -> Option<&Key<T>> {
        self.keys.first()
    }

    pub fn last_key(&self) -> Option<&Key<T>> {
        self.keys.last()
    }

    pub fn add_key(&mut self, time: f32, value: T) {
        let key = Key { time, value };
        match self.keys.last() {
            Some(last) if last.time > time => {
                let index = self.keys.partition_point(|k| k.time <= time);
                self.keys.insert(index, key);
            }
            _ => self.keys.push(key),
        }
    }

    /// Samples the track, holding the first and last values outside the keyed range.
    pub fn value_at_time(&self, time: f32) -> Option<T> {
        let first = self.keys.first()?;
        let index = self.keys.partition_point(|k| k.time <= time);
        if index == 0 {
            return Some(first.value);
        }
        if index >= self.keys.len() {
            return self.keys.last().map(|k| k.value);
        }
        let prev = &self.keys[index - 1];
        let next = &self.keys[index];
        let denom = next.time - prev.time;
        if denom.abs() <= 1.0e-12 {
            return Some(next.value);
        }
        let t = (time - prev.time) / denom;
        Some(T::interpolate(prev.value, next.value, t))
    }

    /// Removes interior keys that the neighbouring keys already reproduce within `max_error`.
    /// Returns the number of removed keys.
    pub fn optimize(&mut self, max_error: f32) -> usize {
        if self.keys.len() < 3 {
            return 0;
        }

        let before = self.keys.len();
        let mut index = 1;
        while index + 1 < self.keys.len() {
            let prev = self.keys[index - 1];
            let key = self.keys[index];
            let next = self.keys[index + 1];
            let denom = next.time - prev.time;
            let t = if denom.abs() <= 1.0e-12 {
                0.0
            } else {
                (key.time - prev.time) / denom
            };
            let predicted = T::interpolate(prev.value, next.value, t);
            if T::is_close(predicted, key.value, max_error) {
                self.keys.remove(index);
            } else {
                index += 1;
            }
        }
        before - self.keys.len()
    }

    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.keys.capacity() * std::mem::size_of::<Key<T>>()
    }
}
