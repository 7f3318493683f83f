//! The animation loop: one tick per host frame callback.

use std::fmt;
use std::time::Instant;

use log::warn;

use crate::app::SceneContext;
use crate::load::LoadQueue;

/// Host primitive that schedules the next frame callback.
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

/// Source of elapsed seconds since scene start.
pub trait Clock {
    fn elapsed(&self) -> f32;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

/// Receives one finished frame per tick.
pub trait FrameSink {
    type Error: fmt::Display;

    fn submit(&mut self, scene: &SceneContext) -> Result<(), Self::Error>;
}

/// Sink that discards frames, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink {
    pub submitted: u64,
}

impl FrameSink for NullSink {
    type Error = std::convert::Infallible;

    fn submit(&mut self, _scene: &SceneContext) -> Result<(), Self::Error> {
        self.submitted += 1;
        Ok(())
    }
}

/// Scheduler that only counts requests; the caller drives the ticks.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingScheduler {
    pub requested: u64,
}

impl FrameScheduler for CountingScheduler {
    fn request_frame(&mut self) {
        self.requested += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub elapsed: f32,
}

pub struct AnimationLoop<C> {
    clock: C,
    last_elapsed: f32,
    frames: u64,
    loads: Option<LoadQueue>,
}

impl<C: Clock> AnimationLoop<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last_elapsed: 0.0,
            frames: 0,
            loads: None,
        }
    }

    /// Drains `queue` at the start of every tick.
    pub fn with_load_queue(mut self, queue: LoadQueue) -> Self {
        self.loads = Some(queue);
        self
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs one frame. The next frame is requested even when the sink
    /// fails, so a transient surface error does not stall the loop.
    pub fn tick<K: FrameSink>(
        &mut self,
        scene: &mut SceneContext,
        sink: &mut K,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<FrameReport, K::Error> {
        if let Some(queue) = &self.loads {
            while let Some(event) = queue.try_next() {
                // Failures are logged and recorded in the load state.
                let _ = scene.handle_load_event(event);
            }
        }

        let elapsed = self.clock.elapsed().max(self.last_elapsed);
        self.last_elapsed = elapsed;

        scene.push_time(elapsed);
        scene.update_controls();
        scene.update_fires(elapsed);

        let submitted = sink.submit(scene);
        scheduler.request_frame();
        self.frames += 1;

        if let Err(err) = &submitted {
            warn!("frame {} was not presented: {err}", self.frames);
        }
        submitted.map(|()| FrameReport {
            frame: self.frames,
            elapsed,
        })
    }
}

impl<C: fmt::Debug> fmt::Debug for AnimationLoop<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationLoop")
            .field("clock", &self.clock)
            .field("last_elapsed", &self.last_elapsed)
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::app::tests::{loaded, scene};
    use crate::assembler::tests::portal_model;
    use crate::material::{self, Color};
    use crate::tunables::PORTAL_COLOR_START;
    use crate::viewport::tests::RecordingSurface;

    #[derive(Debug, Clone, Default)]
    struct ManualClock(Rc<Cell<f32>>);

    impl ManualClock {
        fn set(&self, seconds: f32) {
            self.0.set(seconds);
        }
    }

    impl Clock for ManualClock {
        fn elapsed(&self) -> f32 {
            self.0.get()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Recorded {
        portal_time: Option<f32>,
        fireflies_time: Option<f32>,
        fire_time: Option<f32>,
        fires: [Vec3; 2],
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        frames: Vec<Recorded>,
        fail: bool,
    }

    impl FrameSink for RecordingSink {
        type Error = String;

        fn submit(&mut self, scene: &SceneContext) -> Result<(), String> {
            let fire_time = match scene.material(material::MaterialId::Fire(0)) {
                Some(material::MaterialRef::Shader(fire)) => fire.float(material::TIME),
                _ => None,
            };
            self.frames.push(Recorded {
                portal_time: scene.materials().portal().float(material::TIME),
                fireflies_time: scene.materials().fireflies().float(material::TIME),
                fire_time,
                fires: scene.fire_positions(),
            });
            if self.fail {
                Err("surface lost".into())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn one_tick_submits_once_and_requests_once() {
        let mut scene = scene();
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut animation = AnimationLoop::new(ManualClock::default());
        for expected in 1..=3 {
            animation.tick(&mut scene, &mut sink, &mut scheduler).unwrap();
            assert_eq!(sink.frames.len(), expected);
            assert_eq!(scheduler.requested, expected as u64);
        }
    }

    #[test]
    fn uniforms_are_written_before_submit() {
        let mut scene = scene();
        let clock = ManualClock::default();
        clock.set(1.5);
        let mut sink = RecordingSink::default();
        let mut animation = AnimationLoop::new(clock);
        animation
            .tick(&mut scene, &mut sink, &mut CountingScheduler::default())
            .unwrap();
        let frame = &sink.frames[0];
        assert_eq!(frame.portal_time, Some(1.5));
        assert_eq!(frame.fireflies_time, Some(1.5));
        assert_eq!(frame.fire_time, Some(1.5));
    }

    #[test]
    fn elapsed_time_never_decreases() {
        let mut scene = scene();
        let clock = ManualClock::default();
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut animation = AnimationLoop::new(clock.clone());
        let mut previous = 0.0;
        for sample in [0.1, 0.5, 0.4, 0.4, 2.0, 1.0] {
            clock.set(sample);
            let report = animation.tick(&mut scene, &mut sink, &mut scheduler).unwrap();
            assert!(report.elapsed >= previous);
            previous = report.elapsed;
        }
        let times: Vec<_> = sink.frames.iter().filter_map(|f| f.portal_time).collect();
        assert_eq!(times, [0.1, 0.5, 0.5, 0.5, 2.0, 2.0]);
    }

    #[test]
    fn fires_stay_inert_until_model_arrives() {
        let mut scene = scene();
        let queue = LoadQueue::new();
        let callback = queue.callback();
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut animation = AnimationLoop::new(ManualClock::default()).with_load_queue(queue);

        const ARRIVAL: usize = 5;
        for _ in 0..ARRIVAL {
            animation.tick(&mut scene, &mut sink, &mut scheduler).unwrap();
        }
        callback(loaded(Ok(portal_model())));
        for _ in 0..3 {
            animation.tick(&mut scene, &mut sink, &mut scheduler).unwrap();
        }

        for (index, frame) in sink.frames.iter().enumerate() {
            if index < ARRIVAL {
                assert_eq!(frame.fires, [Vec3::ZERO; 2], "frame {index}");
            } else {
                assert!(frame.fires[0].distance(Vec3::new(1.0, 0.61, 0.0)) < 1e-5);
                assert!(frame.fires[1].distance(Vec3::new(-1.0, 0.61, 0.2)) < 1e-5);
            }
        }
    }

    #[test]
    fn failed_submit_still_requests_next_frame() {
        let mut scene = scene();
        let mut sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let mut scheduler = CountingScheduler::default();
        let mut animation = AnimationLoop::new(ManualClock::default());
        assert!(animation.tick(&mut scene, &mut sink, &mut scheduler).is_err());
        assert_eq!(scheduler.requested, 1);
        assert_eq!(animation.frames(), 1);
    }

    #[test]
    fn tunable_change_does_not_leak_into_other_uniforms() {
        let mut scene = scene();
        let mut animation = AnimationLoop::new(ManualClock::default());
        let mut sink = NullSink::default();
        let mut scheduler = CountingScheduler::default();
        animation.tick(&mut scene, &mut sink, &mut scheduler).unwrap();
        let before = scene.materials().clone();
        scene
            .set_color_tunable(PORTAL_COLOR_START, Color::WHITE, &mut RecordingSurface::default())
            .unwrap();
        animation.tick(&mut scene, &mut sink, &mut scheduler).unwrap();
        assert_eq!(scene.materials().fireflies(), before.fireflies());
        assert_eq!(
            scene.materials().portal().color(material::COLOR_END),
            before.portal().color(material::COLOR_END)
        );
        assert_eq!(
            scene.materials().portal().color(material::COLOR_START),
            Some(Color::WHITE)
        );
        assert_eq!(sink.submitted, 2);
    }
}
