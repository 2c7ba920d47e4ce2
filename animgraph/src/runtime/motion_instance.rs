use crate::{EventInfo, EventState, Motion, MotionEvent, Pose, SkeletonData, Transform};
use std::sync::Arc;

const TIME_EPSILON: f32 = 1.0e-5;

/// Playback state of one motion inside one anim-graph instance.
#[derive(Clone, Debug)]
pub struct MotionInstance {
    motion: Arc<dyn Motion>,
    current_time: f32,
    last_time: f32,
    play_speed: f32,
    paused: bool,
    looping: bool,
    num_loops: u32,
    has_looped: bool,
    has_ended: bool,
}

impl MotionInstance {
    pub fn new(motion: Arc<dyn Motion>) -> Self {
        Self {
            motion,
            current_time: 0.0,
            last_time: 0.0,
            play_speed: 1.0,
            paused: false,
            looping: true,
            num_loops: 0,
            has_looped: false,
            has_ended: false,
        }
    }

    pub fn motion(&self) -> &Arc<dyn Motion> {
        &self.motion
    }

    pub fn duration(&self) -> f32 {
        self.motion.duration()
    }

    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    pub fn last_time(&self) -> f32 {
        self.last_time
    }

    pub fn set_current_time(&mut self, time: f32, reset_last_time: bool) {
        self.current_time = time.clamp(0.0, self.duration().max(0.0));
        if reset_last_time {
            self.last_time = self.current_time;
            self.has_looped = false;
        }
    }

    pub fn normalized_time(&self) -> f32 {
        let duration = self.duration();
        if duration > TIME_EPSILON {
            self.current_time / duration
        } else {
            0.0
        }
    }

    pub fn play_speed(&self) -> f32 {
        self.play_speed
    }

    pub fn set_play_speed(&mut self, speed: f32) {
        self.play_speed = speed;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn num_loops(&self) -> u32 {
        self.num_loops
    }

    pub fn has_looped(&self) -> bool {
        self.has_looped
    }

    pub fn has_ended(&self) -> bool {
        self.has_ended
    }

    /// Restores the raw playback fields, used when replaying recorded state.
    pub(crate) fn restore_state(&mut self, current_time: f32, last_time: f32, num_loops: u32) {
        self.current_time = current_time;
        self.last_time = last_time;
        self.num_loops = num_loops;
        self.has_looped = false;
    }

    pub fn update(&mut self, time_passed: f32) {
        self.last_time = self.current_time;
        self.has_looped = false;
        if self.paused {
            return;
        }

        let duration = self.duration();
        let mut time = self.current_time + time_passed * self.play_speed;
        if duration <= TIME_EPSILON {
            self.current_time = 0.0;
            self.has_ended = true;
            return;
        }

        if self.looping {
            if time >= duration || time < 0.0 {
                let cycles = (time / duration).floor().abs() as u32;
                self.num_loops += cycles.max(1);
                time = time.rem_euclid(duration);
                self.has_looped = true;
            }
            self.has_ended = false;
        } else {
            if time >= duration {
                time = duration;
                self.has_ended = true;
            } else if time <= 0.0 {
                time = 0.0;
                self.has_ended = true;
            } else {
                self.has_ended = false;
            }
        }
        self.current_time = time;
    }

    pub fn sample_pose(&self, skeleton: &SkeletonData, out: &mut Pose) {
        self.motion.sample(self.current_time, skeleton, out);
    }

    /// Events between the last and the current time of the latest update, following a loop
    /// wrap-around when one happened.
    pub fn extract_events(&self, out: &mut Vec<EventInfo>) {
        let events = self.motion.events();
        if events.is_empty() {
            return;
        }
        if !self.has_looped {
            collect_range(events, self.last_time, self.current_time, false, out);
            return;
        }

        let duration = self.duration();
        if self.play_speed >= 0.0 {
            collect_range(events, self.last_time, duration, false, out);
            collect_range(events, 0.0, self.current_time, true, out);
        } else {
            collect_range(events, 0.0, self.last_time, true, out);
            collect_range(events, self.current_time, duration, false, out);
        }
    }

    /// Events in `(from, to]` (or `(to, from]` when playing backwards), without any wrapping.
    pub fn extract_events_non_loop(&self, from: f32, to: f32, out: &mut Vec<EventInfo>) {
        if (to - from).abs() < TIME_EPSILON {
            return;
        }
        let (start, end) = if from <= to { (from, to) } else { (to, from) };
        collect_range(self.motion.events(), start, end, false, out);
    }

    /// Root-motion delta of `bone` covering the latest update.
    pub fn extract_motion(&self, skeleton: &SkeletonData, bone: usize) -> Transform {
        let Some(bind) = skeleton.bones.get(bone).map(|b| b.bind) else {
            return Transform::IDENTITY;
        };
        let sample = |time: f32| self.motion.sample_bone(time, skeleton, bone, &bind);

        if !self.has_looped {
            return delta_between(&sample(self.last_time), &sample(self.current_time));
        }

        let duration = self.duration();
        let (first_end, second_start) = if self.play_speed >= 0.0 {
            (duration, 0.0)
        } else {
            (0.0, duration)
        };
        let a = delta_between(&sample(self.last_time), &sample(first_end));
        let b = delta_between(&sample(second_start), &sample(self.current_time));
        Transform {
            position: a.position + b.position,
            rotation: (a.rotation * b.rotation).normalize(),
            scale: glam::Vec3::ONE,
        }
    }
}

fn delta_between(from: &Transform, to: &Transform) -> Transform {
    Transform {
        position: to.position - from.position,
        rotation: (from.rotation.conjugate() * to.rotation).normalize(),
        scale: glam::Vec3::ONE,
    }
}

fn collect_range(
    events: &[MotionEvent],
    from: f32,
    to: f32,
    include_from: bool,
    out: &mut Vec<EventInfo>,
) {
    let in_range = |t: f32| (t > from || (include_from && t >= from)) && t <= to;
    for event in events {
        if event.is_tick_event() {
            if in_range(event.start_time) {
                out.push(EventInfo::new(event.start_time, event.clone(), EventState::Start));
            }
            continue;
        }

        let starts = in_range(event.start_time);
        let ends = in_range(event.end_time);
        if starts {
            out.push(EventInfo::new(event.start_time, event.clone(), EventState::Start));
        }
        if ends {
            out.push(EventInfo::new(event.end_time, event.clone(), EventState::End));
        }
        if !starts && !ends && event.start_time <= from && event.end_time > to {
            out.push(EventInfo::new(to, event.clone(), EventState::Active));
        }
    }
}
