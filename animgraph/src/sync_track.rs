#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncEvent {
    pub time: f32,
    pub id: u32,
}

/// Stable id for a named sync event (e.g. "LeftFoot"). FNV-1a over the UTF-8 bytes.
pub fn sync_event_id(name: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in name.as_bytes() {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Timing markers of one clip, used to align clips of different lengths segment by segment.
#[derive(Clone, Debug, Default)]
pub struct SyncTrack {
    events: Vec<SyncEvent>,
    duration: f32,
}

impl SyncTrack {
    pub fn new(duration: f32, mut events: Vec<SyncEvent>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { events, duration }
    }

    pub fn events(&self) -> &[SyncEvent] {
        &self.events
    }

    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    pub fn event(&self, index: usize) -> Option<&SyncEvent> {
        self.events.get(index)
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Returns the pair of event indices enclosing `time`. Times before the first or at/after the
    /// last event fall into the wrapping segment `(last, 0)`.
    pub fn find_event_indices(&self, time: f32) -> Option<(usize, usize)> {
        let count = self.events.len();
        if count == 0 {
            return None;
        }
        let first = self.events[0].time;
        let last = self.events[count - 1].time;
        if count == 1 || time < first || time >= last {
            return Some((count - 1, 0));
        }
        let index = self.events.partition_point(|e| e.time <= time);
        Some((index - 1, index))
    }

    /// Searches (wrapping) from `start` for a segment whose left and right events carry the given
    /// ids.
    pub fn find_matching_events(
        &self,
        start: usize,
        left_id: u32,
        right_id: u32,
        forward: bool,
    ) -> Option<(usize, usize)> {
        let count = self.events.len();
        if count == 0 {
            return None;
        }
        let start = start % count;
        for step in 0..count {
            let index = if forward {
                (start + step) % count
            } else {
                (start + count - step) % count
            };
            let next = (index + 1) % count;
            if self.events[index].id == left_id && self.events[next].id == right_id {
                return Some((index, next));
            }
        }
        None
    }

    /// How many segments with the same id pair precede the segment starting at `left`.
    pub fn calc_occurrence(&self, left: usize, right: usize) -> usize {
        let (Some(l), Some(r)) = (self.events.get(left), self.events.get(right)) else {
            return 0;
        };
        let count = self.events.len();
        (0..left)
            .filter(|&i| {
                self.events[i].id == l.id && self.events[(i + 1) % count].id == r.id
            })
            .count()
    }

    /// Finds the `occurrence`-th segment with the given id pair, wrapping around when the track
    /// has fewer matches.
    pub fn extract_occurrence(
        &self,
        occurrence: usize,
        left_id: u32,
        right_id: u32,
    ) -> Option<(usize, usize)> {
        let count = self.events.len();
        let matches: Vec<usize> = (0..count)
            .filter(|&i| {
                self.events[i].id == left_id && self.events[(i + 1) % count].id == right_id
            })
            .collect();
        if matches.is_empty() {
            return None;
        }
        let index = matches[occurrence % matches.len()];
        Some((index, (index + 1) % count))
    }

    pub fn calc_segment_length(&self, left: usize, right: usize) -> f32 {
        let (Some(l), Some(r)) = (self.events.get(left), self.events.get(right)) else {
            return 0.0;
        };
        if left < right {
            r.time - l.time
        } else {
            (self.duration - l.time) + r.time
        }
    }
}
