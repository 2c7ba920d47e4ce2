use crate::runtime::test_fixtures::{ROOT, assert_approx, skeleton, walk_motion};
use crate::{EventState, KeyframeMotion, MotionInstance};
use std::sync::Arc;

fn walk() -> MotionInstance {
    MotionInstance::new(Arc::new(walk_motion()))
}

#[test]
fn looping_wraps_and_counts_loops() {
    let mut mi = walk();
    mi.update(0.7);
    assert_approx(mi.current_time(), 0.7);
    assert!(!mi.has_looped());

    mi.update(0.5);
    assert_approx(mi.current_time(), 0.2);
    assert_approx(mi.last_time(), 0.7);
    assert!(mi.has_looped());
    assert_eq!(mi.num_loops(), 1);
}

#[test]
fn backwards_playback_wraps_to_the_end() {
    let mut mi = walk();
    mi.set_current_time(0.2, true);
    mi.set_play_speed(-1.0);
    mi.update(0.5);
    assert_approx(mi.current_time(), 0.7);
    assert!(mi.has_looped());
    assert_eq!(mi.num_loops(), 1);
}

#[test]
fn non_looping_clamps_and_ends() {
    let mut mi = walk();
    mi.set_looping(false);
    mi.update(1.5);
    assert_approx(mi.current_time(), 1.0);
    assert!(mi.has_ended());
    assert_eq!(mi.num_loops(), 0);

    mi.set_play_speed(-1.0);
    mi.update(3.0);
    assert_approx(mi.current_time(), 0.0);
    assert!(mi.has_ended());
}

#[test]
fn paused_instance_holds_its_time() {
    let mut mi = walk();
    mi.update(0.25);
    mi.set_paused(true);
    mi.update(0.5);
    assert_approx(mi.current_time(), 0.25);
    assert_approx(mi.last_time(), 0.25);
}

#[test]
fn set_current_time_clamps_to_duration() {
    let mut mi = walk();
    mi.set_current_time(4.0, true);
    assert_approx(mi.current_time(), 1.0);
    assert_approx(mi.normalized_time(), 1.0);
    mi.set_current_time(-1.0, false);
    assert_approx(mi.current_time(), 0.0);
}

#[test]
fn zero_length_motion_stays_at_start() {
    let mut mi = MotionInstance::new(Arc::new(KeyframeMotion::new("empty", 0.0)));
    mi.update(0.5);
    assert_approx(mi.current_time(), 0.0);
    assert_approx(mi.normalized_time(), 0.0);
    assert!(mi.has_ended());
}

#[test]
fn events_follow_ranged_event_lifetime() {
    let mut mi = walk();
    let mut events = Vec::new();

    mi.update(0.3);
    mi.extract_events(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_type, "footstep");
    assert_eq!(events[0].state, EventState::Start);

    events.clear();
    mi.update(0.2);
    mi.extract_events(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_type, "swing");
    assert_eq!(events[0].state, EventState::Start);

    events.clear();
    mi.update(0.05);
    mi.extract_events(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, EventState::Active);
    assert_approx(events[0].time_value, 0.55);

    events.clear();
    mi.update(0.15);
    mi.extract_events(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, EventState::End);
    assert_approx(events[0].time_value, 0.6);
}

#[test]
fn events_across_the_loop_point_are_reported_once() {
    let mut mi = walk();
    mi.set_current_time(0.9, true);
    mi.update(0.4);

    let mut events = Vec::new();
    mi.extract_events(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_type, "footstep");
}

#[test]
fn non_loop_extraction_accepts_either_direction() {
    let mi = walk();
    let mut events = Vec::new();
    mi.extract_events_non_loop(0.7, 0.2, &mut events);
    let states: Vec<_> = events.iter().map(|e| (e.event.event_type.as_str(), e.state)).collect();
    assert_eq!(
        states,
        vec![
            ("footstep", EventState::Start),
            ("swing", EventState::Start),
            ("swing", EventState::End),
        ]
    );

    events.clear();
    mi.extract_events_non_loop(0.3, 0.3, &mut events);
    assert!(events.is_empty());
}

#[test]
fn motion_extraction_covers_the_last_update() {
    let skeleton = skeleton();
    let mut mi = walk();
    mi.set_current_time(0.2, true);
    mi.update(0.3);
    let delta = mi.extract_motion(&skeleton, ROOT);
    assert_approx(delta.position.x, 0.6);

    mi.set_current_time(0.9, true);
    mi.update(0.2);
    let delta = mi.extract_motion(&skeleton, ROOT);
    assert_approx(delta.position.x, 0.4);

    let none = mi.extract_motion(&skeleton, 42);
    assert!(none.is_close(&crate::Transform::IDENTITY, 1.0e-6));
}
