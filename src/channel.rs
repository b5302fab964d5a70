//! Regulatory bands and channel-index arithmetic.
//!
//! A band is a frequency function `Fn = start + n * step` over an inclusive
//! index window. Resolving a requested MHz window (or an explicit band/index
//! pair) yields a [`ChannelSelection`] that is always inside its band.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Absorbs float noise in (f - start) / step, e.g. 0.999999 for 0.2 MHz steps.
const INDEX_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("no single band supports any channel inside {min_mhz:.3}..{max_mhz:.3} MHz")]
    NoChannelOverlap { min_mhz: f64, max_mhz: f64 },

    #[error("no band registered with id {0}")]
    UnknownBand(u8),

    #[error("indices {min_index}..{max_index} are outside the range of band {band}")]
    IndexOutOfRange { band: u8, min_index: u8, max_index: u8 },

    #[error("minIndex {min_index} is greater than maxIndex {max_index}")]
    InvalidRange { min_index: u8, max_index: u8 },

    #[error("requested window {min_mhz:.3}..{max_mhz:.3} MHz is not a finite ascending range")]
    InvalidWindow { min_mhz: f64, max_mhz: f64 },

    #[error("invalid band {id}: {reason}")]
    InvalidBand { id: u8, reason: &'static str },

    #[error("band id {0} is registered twice")]
    DuplicateBand(u8),

    #[error("hop plan must contain at least one channel selection")]
    EmptyHopPlan,

    #[error("hop plan holds at most {0} channel selections")]
    HopPlanTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    id: u8,
    name: &'static str,
    start_mhz: f64,
    step_mhz: f64,
    min_index: u8,
    max_index: u8,
}

impl Band {
    /// Build a validated band: `step > 0` and `min_index <= max_index`.
    pub fn new(
        id: u8,
        name: &'static str,
        start_mhz: f64,
        step_mhz: f64,
        min_index: u8,
        max_index: u8,
    ) -> Result<Self, ChannelError> {
        if !step_mhz.is_finite() || step_mhz <= 0.0 {
            return Err(ChannelError::InvalidBand { id, reason: "step must be positive" });
        }
        if !start_mhz.is_finite() {
            return Err(ChannelError::InvalidBand { id, reason: "start frequency must be finite" });
        }
        if min_index > max_index {
            return Err(ChannelError::InvalidBand { id, reason: "minIndex exceeds maxIndex" });
        }
        Ok(Self::preset(id, name, start_mhz, step_mhz, min_index, max_index))
    }

    const fn preset(
        id: u8,
        name: &'static str,
        start_mhz: f64,
        step_mhz: f64,
        min_index: u8,
        max_index: u8,
    ) -> Self {
        Self { id, name, start_mhz, step_mhz, min_index, max_index }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start_mhz(&self) -> f64 {
        self.start_mhz
    }

    pub fn step_mhz(&self) -> f64 {
        self.step_mhz
    }

    pub fn min_index(&self) -> u8 {
        self.min_index
    }

    pub fn max_index(&self) -> u8 {
        self.max_index
    }

    /// Center frequency (MHz) of channel `n`.
    pub fn frequency(&self, n: u8) -> f64 {
        self.start_mhz + f64::from(n) * self.step_mhz
    }

    /// Inclusive index window of this band covered by `[min_mhz, max_mhz]`,
    /// or `None` when no channel of the band falls inside it.
    pub fn indices_for_range(&self, min_mhz: f64, max_mhz: f64) -> Option<(u8, u8)> {
        let lower = ((min_mhz - self.start_mhz) / self.step_mhz - INDEX_EPSILON).ceil();
        let upper = ((max_mhz - self.start_mhz) / self.step_mhz + INDEX_EPSILON).floor();
        // f64::max/min would swallow a NaN and widen the window to the whole band.
        if lower.is_nan() || upper.is_nan() {
            return None;
        }

        let lower = lower.max(f64::from(self.min_index));
        let upper = upper.min(f64::from(self.max_index));

        if lower > upper {
            return None;
        }
        // Both bounds now sit inside [min_index, max_index], so they fit in u8.
        Some((lower as u8, upper as u8))
    }
}

/// Center frequency (MHz) of channel `n` in `band`.
pub fn frequency_for_index(band: &Band, n: u8) -> f64 {
    band.frequency(n)
}

/// A band plus a resolved index window inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSelection {
    band: Band,
    min_index: u8,
    max_index: u8,
}

impl ChannelSelection {
    pub fn band(&self) -> &Band {
        &self.band
    }

    pub fn band_id(&self) -> u8 {
        self.band.id
    }

    pub fn min_index(&self) -> u8 {
        self.min_index
    }

    pub fn max_index(&self) -> u8 {
        self.max_index
    }

    pub fn min_frequency(&self) -> f64 {
        self.band.frequency(self.min_index)
    }

    pub fn max_frequency(&self) -> f64 {
        self.band.frequency(self.max_index)
    }

    pub fn channel_count(&self) -> usize {
        usize::from(self.max_index - self.min_index) + 1
    }

    /// Center frequencies of every channel in the window, ascending.
    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        (self.min_index..=self.max_index).map(move |n| self.band.frequency(n))
    }
}

impl core::fmt::Display for ChannelSelection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "band {} ({}) indices {}..{} = {:.3} ~ {:.3} MHz",
            self.band.id,
            self.band.name,
            self.min_index,
            self.max_index,
            self.min_frequency(),
            self.max_frequency()
        )
    }
}

/// One entry of the frequency configuration: an explicit band window or a
/// MHz window that is resolved against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencySpec {
    Indexed {
        band: u8,
        #[serde(rename = "minN")]
        min_index: u8,
        #[serde(rename = "maxN")]
        max_index: u8,
    },
    Range {
        min: f64,
        max: f64,
    },
}

const REGULATORY_BANDS: &[Band] = &[
    Band::preset(1, "Chinese 2", 920.125, 0.25, 0, 19),
    Band::preset(2, "US", 902.75, 0.50, 0, 49),
    Band::preset(3, "Korean", 917.10, 0.20, 0, 31),
    Band::preset(4, "EU lower", 865.10, 0.20, 0, 14),
    Band::preset(6, "Ukraine", 868.00, 0.10, 0, 6),
    Band::preset(8, "Chinese 1", 840.125, 0.25, 0, 19),
    Band::preset(9, "EU 3", 865.70, 0.60, 0, 3),
    Band::preset(12, "US 3", 902.00, 0.50, 0, 52),
    Band::preset(16, "Hong Kong", 920.25, 0.50, 0, 9),
    Band::preset(17, "Taiwan", 920.75, 0.50, 0, 13),
    Band::preset(18, "ETSI upper", 916.30, 1.20, 0, 2),
    Band::preset(19, "Malaysia", 919.25, 0.50, 0, 7),
    Band::preset(21, "Brazil", 902.75, 0.50, 0, 34),
    Band::preset(22, "Thailand", 920.25, 0.50, 0, 9),
    Band::preset(23, "Singapore", 920.25, 0.50, 0, 9),
    Band::preset(24, "Australia", 920.25, 0.50, 0, 9),
    Band::preset(25, "India", 865.10, 0.60, 0, 3),
    Band::preset(26, "Uruguay", 916.25, 0.50, 0, 22),
    Band::preset(27, "Vietnam", 918.75, 0.50, 0, 7),
    Band::preset(28, "Israel", 916.25, 0.50, 0, 0),
    Band::preset(29, "Indonesia", 917.25, 0.50, 0, 3),
    Band::preset(30, "New Zealand", 922.25, 0.50, 0, 9),
    Band::preset(31, "Japan 2", 916.80, 1.20, 0, 3),
    Band::preset(32, "Peru", 916.25, 0.50, 0, 22),
    Band::preset(33, "Russia", 916.20, 1.20, 0, 3),
    Band::preset(34, "South Africa", 915.60, 0.20, 0, 16),
    Band::preset(35, "Philippines", 918.25, 0.50, 0, 3),
];

/// Immutable band registry. Built once and handed to whoever resolves channels.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    // Sorted by id; resolution walks this order so ties go to the lowest id.
    bands: Vec<Band>,
}

impl ChannelPlan {
    pub fn new(bands: impl IntoIterator<Item = Band>) -> Result<Self, ChannelError> {
        let mut bands: Vec<Band> = bands.into_iter().collect();
        bands.sort_by_key(Band::id);
        if let Some(pair) = bands.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(ChannelError::DuplicateBand(pair[0].id));
        }
        Ok(Self { bands })
    }

    /// The built-in regulatory table.
    pub fn regulatory() -> Self {
        let mut bands = REGULATORY_BANDS.to_vec();
        bands.sort_by_key(Band::id);
        Self { bands }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, id: u8) -> Option<&Band> {
        self.bands.iter().find(|band| band.id == id)
    }

    /// Pick the band covering the most channels inside `[min_mhz, max_mhz]`.
    ///
    /// Ties on channel count are broken by the lowest band id.
    pub fn resolve_by_range(&self, min_mhz: f64, max_mhz: f64) -> Result<ChannelSelection, ChannelError> {
        if !min_mhz.is_finite() || !max_mhz.is_finite() || min_mhz > max_mhz {
            return Err(ChannelError::InvalidWindow { min_mhz, max_mhz });
        }

        let mut best: Option<(usize, ChannelSelection)> = None;
        for band in &self.bands {
            let Some((min_index, max_index)) = band.indices_for_range(min_mhz, max_mhz) else {
                continue;
            };
            let candidate = ChannelSelection { band: *band, min_index, max_index };
            let count = candidate.channel_count();
            match best {
                Some((best_count, _)) if best_count >= count => {}
                _ => best = Some((count, candidate)),
            }
        }

        best.map(|(_, selection)| selection)
            .ok_or(ChannelError::NoChannelOverlap { min_mhz, max_mhz })
    }

    pub fn resolve_by_index(&self, band_id: u8, min_index: u8, max_index: u8) -> Result<ChannelSelection, ChannelError> {
        let band = self.band(band_id).ok_or(ChannelError::UnknownBand(band_id))?;

        if min_index < band.min_index || max_index > band.max_index {
            return Err(ChannelError::IndexOutOfRange { band: band_id, min_index, max_index });
        }
        if min_index > max_index {
            return Err(ChannelError::InvalidRange { min_index, max_index });
        }

        Ok(ChannelSelection { band: *band, min_index, max_index })
    }

    pub fn resolve(&self, spec: &FrequencySpec) -> Result<ChannelSelection, ChannelError> {
        match *spec {
            FrequencySpec::Indexed { band, min_index, max_index } => {
                self.resolve_by_index(band, min_index, max_index)
            }
            FrequencySpec::Range { min, max } => self.resolve_by_range(min, max),
        }
    }
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self::regulatory()
    }
}
