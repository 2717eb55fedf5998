//! Core data types for the magnifier cortex

use crate::error::{CortexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// A point in screen pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Screen dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

impl ScreenSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.width / 2.0, self.height / 2.0)
    }

    /// Clamp a coordinate into `[0, width] x [0, height]`.
    ///
    /// Non-finite components collapse onto the screen centre rather than
    /// leaking NaN into the viewport.
    pub fn clamp(&self, c: Coordinate) -> Coordinate {
        let center = self.center();
        let x = if c.x.is_nan() { center.x } else { c.x.clamp(0.0, self.width) };
        let y = if c.y.is_nan() { center.y } else { c.y.clamp(0.0, self.height) };
        Coordinate::new(x, y)
    }
}

/// Axis-aligned rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }
}

/// Raw gaze signal from the pupil pipeline. Both axes lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GazeRatio {
    pub x: f64,
    pub y: f64,
}

impl GazeRatio {
    /// Build a ratio, clamping each axis into the unit range.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: unit(x),
            y: unit(y),
        }
    }
}

fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.5
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// A value stamped with the monotonic instant it was published
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedValue<T> {
    pub value: T,
    pub timestamp: Instant,
}

impl<T> TimestampedValue<T> {
    pub fn new(value: T, timestamp: Instant) -> Self {
        Self { value, timestamp }
    }

    /// Age relative to `now`. Saturates at zero, so a timestamp that is
    /// somehow ahead of `now` reads as brand new instead of negative.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }

    /// Borrow the value if it is no older than `timeout`.
    pub fn fresh_within(&self, source: Source, now: Instant, timeout: Duration) -> Result<&T> {
        let age = self.age(now);
        if age > timeout {
            return Err(CortexError::StaleData {
                input: source,
                age_ms: age.as_millis() as u64,
            });
        }
        Ok(&self.value)
    }
}

/// Kind of content a detection was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Confirmation,
    Error,
    Title,
    Button,
    InputField,
    Checkbox,
    Plain,
}

impl Classification {
    /// Guess a classification from recognised text alone.
    ///
    /// Used when a detector reports words without any UI-element hint.
    pub fn infer(text: &str) -> Self {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();

        if ["error", "warning", "alert", "caution"].contains(&lower.as_str()) {
            return Classification::Error;
        }

        if ["ok", "cancel", "submit", "save", "accept"]
            .iter()
            .any(|word| lower.contains(word))
        {
            return Classification::Confirmation;
        }

        let starts_upper = trimmed.chars().next().map(char::is_uppercase).unwrap_or(false);
        if starts_upper && trimmed.chars().count() > 3 {
            return Classification::Title;
        }

        Classification::Plain
    }
}

/// A text region reported by the external content-detection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub bounding_box: Rect,
    pub text: String,
    /// Detector confidence, 0-100
    pub confidence: f64,
    pub classification: Classification,
    /// Glyph height in pixels, when the detector knows it separately from the box
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_px: Option<f64>,
}

impl DetectedRegion {
    pub fn new(
        bounding_box: Rect,
        text: impl Into<String>,
        confidence: f64,
        classification: Classification,
    ) -> Self {
        Self {
            bounding_box,
            text: text.into(),
            confidence,
            classification,
            font_px: None,
        }
    }

    pub fn with_font_px(mut self, font_px: f64) -> Self {
        self.font_px = Some(font_px);
        self
    }

    /// Glyph height used for the size factor. Falls back to the box height.
    pub fn font_size(&self) -> f64 {
        self.font_px.unwrap_or(self.bounding_box.height)
    }

    pub fn char_count(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// One of the three signals the fusion core can draw on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Mouse,
    Gaze,
    Importance,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Mouse, Source::Gaze, Source::Importance];

    pub(crate) fn index(self) -> usize {
        match self {
            Source::Mouse => 0,
            Source::Gaze => 1,
            Source::Importance => 2,
        }
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Mouse => "mouse",
            Source::Gaze => "gaze",
            Source::Importance => "importance",
        };
        f.write_str(name)
    }
}

/// Small set of [`Source`]s
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SourceSet(u8);

impl SourceSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn only(source: Source) -> Self {
        Self(source.bit())
    }

    pub fn insert(&mut self, source: Source) {
        self.0 |= source.bit();
    }

    pub fn contains(&self, source: Source) -> bool {
        self.0 & source.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Source> + '_ {
        Source::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Source> for SourceSet {
    fn from_iter<I: IntoIterator<Item = Source>>(iter: I) -> Self {
        let mut set = SourceSet::empty();
        for source in iter {
            set.insert(source);
        }
        set
    }
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for SourceSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for SourceSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let sources = Vec::<Source>::deserialize(deserializer)?;
        Ok(sources.into_iter().collect())
    }
}

/// How the viewport target is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    FollowMouse,
    FixedPosition,
    ImportanceBased,
    #[default]
    Blended,
}

impl FromStr for FusionMode {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "follow_mouse" | "mouse" => Ok(FusionMode::FollowMouse),
            "fixed_position" | "fixed" => Ok(FusionMode::FixedPosition),
            "importance_based" | "importance" => Ok(FusionMode::ImportanceBased),
            "blended" => Ok(FusionMode::Blended),
            other => Err(CortexError::ConfigurationInvalid(format!(
                "unknown mode '{other}' (expected follow_mouse, fixed_position, importance_based or blended)"
            ))),
        }
    }
}

/// Why a source was left out of a fusion tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ExclusionReason {
    /// No value has been published (or the producer cannot be reached)
    Unavailable,
    /// A value exists but is older than its timeout
    Stale { age_ms: u64 },
    /// The importance map is present but nothing on it scores above zero
    EmptyMap,
    /// The importance candidate did not clear the importance threshold
    BelowThreshold { score: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub source: Source,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

/// Output of one fusion tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub coordinate: Coordinate,
    pub contributing_sources: SourceSet,
    pub mode: FusionMode,
    /// Sources that were considered this tick but left out
    pub exclusions: Vec<Exclusion>,
    /// True when nothing contributed and the previous coordinate was held
    pub held: bool,
}

impl FusionResult {
    pub fn excluded(&self, source: Source) -> Option<ExclusionReason> {
        self.exclusions
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.reason)
    }
}
