//! Pipeline State
//!
//! What the browser's loading machinery exposes to the preloader: buffered
//! ranges and duration for media, a completion flag for images. The host
//! (or a test) feeds these as decoding progresses; the preloader only reads.

/// Time ranges
#[derive(Debug, Clone, Default)]
pub struct TimeRanges {
    ranges: Vec<(f64, f64)>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, start: f64, end: f64) {
        self.ranges.push((start, end));
    }

    pub fn length(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn start(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).map(|(s, _)| *s)
    }

    pub fn end(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).map(|(_, e)| *e)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

/// Loading state of one audio/video element
#[derive(Debug, Clone)]
pub struct MediaState {
    /// Total duration in seconds; NaN until metadata is known
    pub duration: f64,
    /// Buffered time ranges
    pub buffered: TimeRanges,
}

impl MediaState {
    pub fn new() -> Self {
        Self {
            duration: f64::NAN,
            buffered: TimeRanges::new(),
        }
    }

    /// The `load()` reset primitive: discards buffered data and metadata,
    /// as a browser does when sources change.
    pub fn load(&mut self) {
        self.duration = f64::NAN;
        self.buffered.clear();
    }

    /// Fraction of the media buffered from the head, in [0, 1].
    ///
    /// Uses the end of the first buffered range over the total duration;
    /// 0.0 while the duration is unknown.
    pub fn buffered_ratio(&self) -> f64 {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return 0.0;
        }
        match self.buffered.end(0) {
            Some(end) => (end / self.duration).clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}

impl Default for MediaState {
    fn default() -> Self {
        Self::new()
    }
}

/// Loading state of one image element
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageState {
    /// True once the image has fully loaded and decoded
    pub complete: bool,
}

impl ImageState {
    pub fn new() -> Self {
        Self::default()
    }
}
