//! Clock (second-chance) page replacement.
//!
//! Frames form a circle with a hand pointing at the next frame to examine.
//! A hit sets the frame's reference bit. A miss sweeps the hand forward:
//! frames with the bit set lose it and are skipped ("second chance"), and the
//! first frame found with the bit clear receives the new page. Because every
//! skipped frame is cleared, the sweep ends within two revolutions.
//!
//! ```
//! use paging::clock::{Clock, ClockConfig};
//!
//! let mut clock = Clock::new(ClockConfig { frame_count: 3 }).unwrap();
//! for page in [1, 2, 3] {
//!     assert!(clock.access(page).kind.is_miss());
//! }
//! assert!(clock.access(2).kind.is_hit());
//!
//! // The hit left the hand at frame 2. Every frame still has its bit set, so
//! // the sweep clears all of them and comes back to evict page 3.
//! let access = clock.access(4);
//! assert_eq!(access.frame, 2);
//! assert_eq!(access.evicted, Some(3));
//! ```

use alloc::vec::Vec;
use core::fmt;

use arrayvec::ArrayVec;
use snafu::{Snafu, ensure};
use snafu_utils::{Located, Location};

/// Number of accesses kept by [`Clock::history`].
pub const HISTORY_LEN: usize = 10;

/// Largest frame table a [`Clock`] accepts.
pub const MAX_FRAMES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    pub frame_count: usize,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { frame_count: 4 }
    }
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ClockError {
    #[snafu(display("frame count must be between 1 and {MAX_FRAMES}, got {frame_count}"))]
    InvalidFrameCount {
        frame_count: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("hand position {hand} is outside {frame_count} frames"))]
    InvalidHand {
        hand: usize,
        frame_count: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("frame {frame} holds a page that is already resident in frame {other}"))]
    DuplicatePage {
        frame: usize,
        other: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for ClockError {
    fn location(&self) -> Location {
        match self {
            Self::InvalidFrameCount { location, .. }
            | Self::InvalidHand { location, .. }
            | Self::DuplicatePage { location, .. } => *location,
        }
    }
}

/// A physical frame and its reference bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<P> {
    page: Option<P>,
    referenced: bool,
}

impl<P> Frame<P> {
    /// An empty frame, reference bit clear.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            page: None,
            referenced: false,
        }
    }

    /// A frame holding `page` with the given reference bit.
    #[must_use]
    pub const fn with_page(page: P, referenced: bool) -> Self {
        Self {
            page: Some(page),
            referenced,
        }
    }

    #[must_use]
    pub fn page(&self) -> Option<&P> {
        self.page.as_ref()
    }

    #[must_use]
    pub fn referenced(&self) -> bool {
        self.referenced
    }

    #[must_use]
    pub fn reference_bit(&self) -> u8 {
        u8::from(self.referenced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum AccessKind {
    Hit,
    Miss,
}

/// One step of an access, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum ClockStep<P> {
    Hit { page: P, frame: usize },
    /// The page was not resident; the scan starts at `hand`.
    Miss { page: P, hand: usize },
    /// The frame's reference bit was cleared and the hand moved on.
    SecondChance { frame: usize },
    /// `page` was loaded into `frame`, evicting its previous page if any.
    ///
    /// Rendered without the evicted page, which [`Access::evicted`] carries.
    Replace {
        frame: usize,
        evicted: Option<P>,
        page: P,
    },
}

impl<P> fmt::Display for ClockStep<P>
where
    P: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit { page, frame } => write!(
                f,
                "hit: page {page} found in frame {frame}, reference bit set to 1"
            ),
            Self::Miss { page, hand } => write!(
                f,
                "miss: page {page} not resident, scanning from frame {hand}"
            ),
            Self::SecondChance { frame } => write!(f, "second chance frame {frame}"),
            Self::Replace { frame, page, .. } => write!(f, "replace frame {frame} with {page}"),
        }
    }
}

/// Result of [`Clock::access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access<P> {
    pub kind: AccessKind,
    /// Frame now holding the page.
    pub frame: usize,
    /// Page removed from `frame` by a miss.
    pub evicted: Option<P>,
    pub steps: Vec<ClockStep<P>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockStats {
    pub hits: u64,
    pub misses: u64,
}

impl ClockStats {
    #[must_use]
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of accesses that hit, or 0 before the first access.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord<P> {
    pub page: P,
    pub kind: AccessKind,
    pub frame: usize,
}

/// Clock replacement over a fixed number of frames.
///
/// `P` identifies a page. The replacer never creates pages itself; it only
/// stores the identifiers it is given.
#[derive(Debug, Clone)]
pub struct Clock<P> {
    frames: Vec<Frame<P>>,
    hand: usize,
    stats: ClockStats,
    history: ArrayVec<AccessRecord<P>, HISTORY_LEN>,
    steps: Vec<ClockStep<P>>,
}

impl<P> Clock<P>
where
    P: Clone + PartialEq,
{
    /// Creates a replacer with every frame empty and the hand at frame 0.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidFrameCount`] if `frame_count` is zero or
    /// larger than [`MAX_FRAMES`].
    pub fn new(config: ClockConfig) -> Result<Self, ClockError> {
        let frame_count = config.frame_count;
        ensure!(
            (1..=MAX_FRAMES).contains(&frame_count),
            clock_error::InvalidFrameCountSnafu { frame_count }
        );
        let frames = (0..config.frame_count).map(|_| Frame::empty()).collect();
        Ok(Self::from_parts(frames, 0))
    }

    /// Creates a replacer from an explicit frame table and hand position.
    ///
    /// # Errors
    ///
    /// Fails if `frames` is empty or longer than [`MAX_FRAMES`], `hand` is out
    /// of range, or a page appears in two frames.
    ///
    /// # Examples
    ///
    /// ```
    /// use paging::clock::{Clock, Frame};
    ///
    /// let frames = vec![
    ///     Frame::with_page('A', true),
    ///     Frame::with_page('B', true),
    ///     Frame::empty(),
    /// ];
    /// let mut clock = Clock::with_frames(frames, 0).unwrap();
    /// let steps: Vec<_> = clock.access('P').steps.iter().map(ToString::to_string).collect();
    /// assert_eq!(&steps[1..], [
    ///     "second chance frame 0",
    ///     "second chance frame 1",
    ///     "replace frame 2 with P",
    /// ]);
    /// ```
    pub fn with_frames(frames: Vec<Frame<P>>, hand: usize) -> Result<Self, ClockError> {
        ensure!(
            (1..=MAX_FRAMES).contains(&frames.len()),
            clock_error::InvalidFrameCountSnafu {
                frame_count: frames.len(),
            }
        );
        ensure!(
            hand < frames.len(),
            clock_error::InvalidHandSnafu {
                hand,
                frame_count: frames.len(),
            }
        );
        for (frame, f) in frames.iter().enumerate() {
            let Some(page) = &f.page else { continue };
            if let Some(other) = frames[..frame]
                .iter()
                .position(|g| g.page.as_ref() == Some(page))
            {
                return clock_error::DuplicatePageSnafu { frame, other }.fail();
            }
        }
        Ok(Self::from_parts(frames, hand))
    }

    fn from_parts(frames: Vec<Frame<P>>, hand: usize) -> Self {
        Self {
            frames,
            hand,
            stats: ClockStats::default(),
            history: ArrayVec::new(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame<P>] {
        &self.frames
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn hand(&self) -> usize {
        self.hand
    }

    #[must_use]
    pub fn stats(&self) -> ClockStats {
        self.stats
    }

    /// The most recent accesses, oldest first.
    #[must_use]
    pub fn history(&self) -> &[AccessRecord<P>] {
        &self.history
    }

    /// Steps of the most recent access.
    #[must_use]
    pub fn steps(&self) -> &[ClockStep<P>] {
        &self.steps
    }

    /// Index of the frame holding `page`.
    #[must_use]
    pub fn resident(&self, page: &P) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.page.as_ref() == Some(page))
    }

    fn advance(&self, frame: usize) -> usize {
        (frame + 1) % self.frames.len()
    }

    /// References `page`, loading it on a miss.
    pub fn access(&mut self, page: P) -> Access<P> {
        self.steps.clear();
        let (kind, frame, evicted) = if let Some(frame) = self.resident(&page) {
            self.frames[frame].referenced = true;
            self.hand = self.advance(frame);
            self.stats.hits += 1;
            self.steps.push(ClockStep::Hit {
                page: page.clone(),
                frame,
            });
            (AccessKind::Hit, frame, None)
        } else {
            self.stats.misses += 1;
            self.steps.push(ClockStep::Miss {
                page: page.clone(),
                hand: self.hand,
            });
            let (frame, evicted) = self.replace(page.clone());
            (AccessKind::Miss, frame, evicted)
        };

        if self.history.is_full() {
            self.history.remove(0);
        }
        self.history.push(AccessRecord { page, kind, frame });

        Access {
            kind,
            frame,
            evicted,
            steps: self.steps.clone(),
        }
    }

    /// Sweeps the hand until a frame with a clear reference bit is found and
    /// loads `page` there.
    fn replace(&mut self, page: P) -> (usize, Option<P>) {
        loop {
            let frame = self.hand;
            self.hand = self.advance(frame);
            let slot = &mut self.frames[frame];
            if slot.referenced {
                slot.referenced = false;
                self.steps.push(ClockStep::SecondChance { frame });
                continue;
            }

            let evicted = slot.page.replace(page.clone());
            slot.referenced = true;
            self.steps.push(ClockStep::Replace {
                frame,
                evicted: evicted.clone(),
                page,
            });
            return (frame, evicted);
        }
    }

    /// Empties every frame whose page matches `pred` and returns the frames
    /// together with the pages removed from them.
    ///
    /// The hand does not move.
    pub fn invalidate<F>(&mut self, mut pred: F) -> Vec<(usize, P)>
    where
        F: FnMut(&P) -> bool,
    {
        let mut removed = Vec::new();
        for (index, frame) in self.frames.iter_mut().enumerate() {
            if frame.page.as_ref().is_some_and(&mut pred) {
                frame.referenced = false;
                if let Some(page) = frame.page.take() {
                    removed.push((index, page));
                }
            }
        }
        removed
    }

    /// Empties every frame and clears statistics and history.
    pub fn reset(&mut self) {
        for frame in &mut self.frames {
            *frame = Frame::empty();
        }
        self.hand = 0;
        self.stats = ClockStats::default();
        self.history.clear();
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::ToString, vec, vec::Vec};

    use super::*;

    fn bits<P>(clock: &Clock<P>) -> Vec<u8>
    where
        P: Clone + PartialEq,
    {
        clock.frames().iter().map(Frame::reference_bit).collect()
    }

    fn pages<P>(clock: &Clock<P>) -> Vec<Option<P>>
    where
        P: Clone + PartialEq,
    {
        clock.frames().iter().map(|f| f.page().cloned()).collect()
    }

    #[test]
    fn test_zero_frames_rejected() {
        let err = Clock::<u32>::new(ClockConfig { frame_count: 0 }).unwrap_err();
        assert!(matches!(err, ClockError::InvalidFrameCount { .. }));
        let err = Clock::<u32>::with_frames(Vec::new(), 0).unwrap_err();
        assert!(matches!(err, ClockError::InvalidFrameCount { .. }));
    }

    #[test]
    fn test_oversized_frame_table_rejected() {
        for frame_count in [MAX_FRAMES + 1, usize::MAX] {
            let err = Clock::<u32>::new(ClockConfig { frame_count }).unwrap_err();
            assert!(matches!(
                err,
                ClockError::InvalidFrameCount { frame_count: n, .. } if n == frame_count
            ));
        }
        let frames = vec![Frame::<u32>::empty(); MAX_FRAMES + 1];
        let err = Clock::with_frames(frames, 0).unwrap_err();
        assert!(matches!(err, ClockError::InvalidFrameCount { .. }));

        let clock = Clock::<u32>::new(ClockConfig {
            frame_count: MAX_FRAMES,
        })
        .unwrap();
        assert_eq!(clock.frame_count(), MAX_FRAMES);
    }

    #[test]
    fn test_with_frames_validation() {
        let err = Clock::with_frames(vec![Frame::with_page(1, false)], 1).unwrap_err();
        assert!(matches!(
            err,
            ClockError::InvalidHand {
                hand: 1,
                frame_count: 1,
                ..
            }
        ));

        let frames = vec![
            Frame::with_page(1, false),
            Frame::empty(),
            Frame::with_page(1, true),
        ];
        let err = Clock::with_frames(frames, 0).unwrap_err();
        assert!(matches!(
            err,
            ClockError::DuplicatePage {
                frame: 2,
                other: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_cold_misses_fill_frames_in_order() {
        let mut clock = Clock::new(ClockConfig { frame_count: 3 }).unwrap();
        for (i, page) in [10, 20, 30].into_iter().enumerate() {
            let access = clock.access(page);
            assert!(access.kind.is_miss());
            assert_eq!(access.frame, i);
            assert_eq!(access.evicted, None);
        }
        assert_eq!(pages(&clock), vec![Some(10), Some(20), Some(30)]);
        assert_eq!(bits(&clock), vec![1, 1, 1]);
        assert_eq!(clock.hand(), 0);
        assert_eq!(clock.stats(), ClockStats { hits: 0, misses: 3 });
    }

    #[test]
    fn test_hit_only_touches_bit_and_hand() {
        let frames = vec![
            Frame::with_page(1, false),
            Frame::with_page(2, false),
            Frame::with_page(3, true),
        ];
        let mut clock = Clock::with_frames(frames, 2).unwrap();
        let access = clock.access(2);
        assert!(access.kind.is_hit());
        assert_eq!(access.frame, 1);
        assert_eq!(
            access.steps,
            vec![ClockStep::Hit { page: 2, frame: 1 }]
        );
        assert_eq!(pages(&clock), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(bits(&clock), vec![0, 1, 1]);
        assert_eq!(clock.hand(), 2);
    }

    #[test]
    fn test_second_chance_scenario() {
        let frames = vec![
            Frame::with_page('A', true),
            Frame::with_page('B', true),
            Frame::with_page('C', false),
        ];
        let mut clock = Clock::with_frames(frames, 0).unwrap();
        let access = clock.access('P');
        assert_eq!(
            access.steps,
            vec![
                ClockStep::Miss { page: 'P', hand: 0 },
                ClockStep::SecondChance { frame: 0 },
                ClockStep::SecondChance { frame: 1 },
                ClockStep::Replace {
                    frame: 2,
                    evicted: Some('C'),
                    page: 'P'
                },
            ]
        );
        let log: Vec<_> = access.steps[1..].iter().map(ToString::to_string).collect();
        assert_eq!(
            log,
            vec![
                "second chance frame 0",
                "second chance frame 1",
                "replace frame 2 with P",
            ]
        );
        assert_eq!(access.evicted, Some('C'));
        assert_eq!(bits(&clock), vec![0, 0, 1]);
        assert_eq!(clock.hand(), 0);
        assert_eq!(clock.steps(), access.steps.as_slice());
    }

    #[test]
    fn test_all_referenced_evicts_frame_at_hand() {
        let frames = vec![
            Frame::with_page(1, true),
            Frame::with_page(2, true),
            Frame::with_page(3, true),
            Frame::with_page(4, true),
        ];
        let mut clock = Clock::with_frames(frames, 2).unwrap();
        let access = clock.access(9);
        assert_eq!(access.frame, 2);
        assert_eq!(access.evicted, Some(3));
        let chances: Vec<_> = access
            .steps
            .iter()
            .filter_map(|s| match s {
                ClockStep::SecondChance { frame } => Some(*frame),
                _ => None,
            })
            .collect();
        assert_eq!(chances, vec![2, 3, 0, 1]);
        assert_eq!(bits(&clock), vec![0, 0, 1, 0]);
        assert_eq!(clock.hand(), 3);
    }

    #[test]
    fn test_scan_is_bounded() {
        let mut clock = Clock::new(ClockConfig { frame_count: 5 }).unwrap();
        for page in 0..5 {
            clock.access(page);
        }
        for page in 5..50 {
            let access = clock.access(page);
            assert!(access.steps.len() <= 2 + 2 * clock.frame_count());
        }
    }

    #[test]
    fn test_history_keeps_last_accesses() {
        let mut clock = Clock::new(ClockConfig { frame_count: 2 }).unwrap();
        for page in 0..15 {
            clock.access(page % 3);
        }
        let history = clock.history();
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history.last().unwrap().page, 14 % 3);
        assert_eq!(history.first().unwrap().page, 5 % 3);
        assert_eq!(clock.stats().accesses(), 15);
    }

    #[test]
    fn test_invalidate() {
        let mut clock = Clock::new(ClockConfig { frame_count: 4 }).unwrap();
        for page in [11, 21, 12, 22] {
            clock.access(page);
        }
        let removed = clock.invalidate(|p| p / 10 == 1);
        assert_eq!(removed, vec![(0, 11), (2, 12)]);
        assert_eq!(pages(&clock), vec![None, Some(21), None, Some(22)]);
        assert_eq!(bits(&clock), vec![0, 1, 0, 1]);

        // The emptied frame at the hand is reused without a second chance.
        let access = clock.access(30);
        assert_eq!(access.frame, 0);
        assert_eq!(access.steps.len(), 2);
    }

    #[test]
    fn test_hit_ratio() {
        let mut clock = Clock::new(ClockConfig::default()).unwrap();
        assert!(clock.stats().hit_ratio().abs() < f64::EPSILON);
        clock.access(1);
        clock.access(1);
        clock.access(1);
        clock.access(2);
        assert!((clock.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
        clock.reset();
        assert_eq!(clock.stats().accesses(), 0);
        assert!(clock.history().is_empty());
        assert_eq!(pages(&clock), vec![None; 4]);
    }
}
