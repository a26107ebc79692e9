//! Steps a layout on a background thread until it is done or stopped.

use crate::error::{Error, Result};
use crate::layout::IterativeLayout;
use log::info;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a layout running on its own thread.
///
/// The layout is moved onto the thread and handed back by [`Animator::stop`] or
/// [`Animator::join`]. Positions can be read from a clone of the layout's store while it
/// runs. Dropping the handle stops the thread after its current step.
pub struct Animator<L> {
    handle: Option<JoinHandle<L>>,
    stop: Arc<AtomicBool>,
    steps: Arc<AtomicUsize>,
}

impl<L: IterativeLayout + 'static> Animator<L> {
    pub fn builder() -> AnimatorBuilder<L> {
        AnimatorBuilder::default()
    }

    /// Start with the default settings.
    pub fn start(layout: L) -> Self {
        AnimatorBuilder::default().start(layout)
    }

    /// Steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the thread to stop after its current step and wait for it.
    pub fn stop(self) -> Result<L> {
        self.stop.store(true, Ordering::Release);
        self.join()
    }

    /// Wait until the layout is done or the step limit is reached.
    pub fn join(mut self) -> Result<L> {
        let handle = self.handle.take().ok_or(Error::AnimatorPanicked)?;
        handle.join().map_err(|_| Error::AnimatorPanicked)
    }
}

impl<L> Drop for Animator<L> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Builder for [`Animator`].
pub struct AnimatorBuilder<L> {
    interval: Duration,
    max_steps: Option<usize>,
    marker: PhantomData<fn() -> L>,
}

impl<L> Default for AnimatorBuilder<L> {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            max_steps: None,
            marker: PhantomData,
        }
    }
}

impl<L: IterativeLayout + 'static> AnimatorBuilder<L> {
    /// Pause between two steps.
    ///
    /// Default: `10ms`
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after this many steps even if the layout is not done.
    ///
    /// Default: `None`
    pub fn max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Move `layout` onto a new thread and start stepping it.
    pub fn start(self, mut layout: L) -> Animator<L> {
        let stop = Arc::new(AtomicBool::new(false));
        let steps = Arc::new(AtomicUsize::new(0));
        let (thread_stop, thread_steps) = (Arc::clone(&stop), Arc::clone(&steps));
        let Self {
            interval,
            max_steps,
            ..
        } = self;

        let handle = thread::spawn(move || {
            info!("Animator started, interval {interval:?}");
            let mut taken = 0;
            while !thread_stop.load(Ordering::Acquire)
                && !layout.done()
                && max_steps.map_or(true, |max| taken < max)
            {
                layout.step();
                taken += 1;
                thread_steps.store(taken, Ordering::Release);
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            info!("Animator stopped after {taken} steps");
            layout
        });

        Animator {
            handle: Some(handle),
            stop,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use crate::layout::{FrLayout, SpringLayout};
    use crate::positions::Positions;
    use glam::Vec2;
    use petgraph::graph::UnGraph;

    fn region() -> Bounds<Vec2> {
        Bounds::centered(Vec2::splat(100.0))
    }

    #[test]
    fn runs_until_the_layout_is_done() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1), (1, 2)]);
        let layout = FrLayout::builder()
            .max_iterations(30)
            .seed(1)
            .build(g, Positions::with_seed(region(), 1))
            .unwrap();
        let animator = Animator::builder().interval(Duration::ZERO).start(layout);
        let layout = animator.join().unwrap();
        assert!(layout.done());
    }

    #[test]
    fn step_limit_applies() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
        let layout = SpringLayout::builder()
            .build(g, Positions::with_seed(region(), 1))
            .unwrap();
        let animator = Animator::builder()
            .interval(Duration::ZERO)
            .max_steps(Some(12))
            .start(layout);
        let layout = animator.join().unwrap();
        assert_eq!(layout.iteration(), 12);
    }

    #[test]
    fn stop_hands_the_layout_back() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
        let layout = SpringLayout::builder()
            .build(g, Positions::with_seed(region(), 1))
            .unwrap();
        let animator = Animator::start(layout);
        thread::sleep(Duration::from_millis(30));
        assert!(animator.is_running());
        let layout = animator.stop().unwrap();
        assert!(layout.iteration() > 0);
        assert!(!layout.done());
    }

    struct Faulty {
        positions: Positions<u32, Vec2>,
    }

    impl IterativeLayout for Faulty {
        type Node = u32;
        type Point = Vec2;

        fn positions(&self) -> &Positions<u32, Vec2> {
            &self.positions
        }

        fn topology_nodes(&self) -> Vec<u32> {
            Vec::new()
        }

        fn initialize(&mut self) {}

        fn reset(&mut self) {}

        fn step(&mut self) {
            panic!("step failed");
        }

        fn done(&self) -> bool {
            false
        }

        fn iteration(&self) -> usize {
            0
        }
    }

    #[test]
    fn panics_are_reported() {
        let animator = Animator::start(Faulty {
            positions: Positions::new(region()),
        });
        assert!(matches!(animator.join(), Err(Error::AnimatorPanicked)));
    }
}
