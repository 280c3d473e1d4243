// src/engine/meter.rs

use serde::{Serialize, Deserialize};

/// Tick granularity within a beat. The divisor is the number of ticks per
/// reference unit (quarter note for simple meters, eighth for compound and
/// asymmetric ones — see `BeatGrid`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subdivision {
    Quarter,
    Eighth,
    Triplet,
    Sixteenth,
}

impl Subdivision {
    pub fn divisor(&self) -> usize {
        match self {
            Subdivision::Quarter => 1,
            Subdivision::Eighth => 2,
            Subdivision::Triplet => 3,
            Subdivision::Sixteenth => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Subdivision::Quarter => "quarter",
            Subdivision::Eighth => "eighth",
            Subdivision::Triplet => "triplet",
            Subdivision::Sixteenth => "sixteenth",
        }
    }
}

impl Default for Subdivision {
    fn default() -> Self {
        Subdivision::Quarter
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterKind {
    Simple,
    Compound,
    Asymmetric,
}

/// Canonical eighth-note groupings for the supported asymmetric numerators.
/// The first option per numerator is the default.
const ASYMMETRIC_GROUPINGS: &[(u32, &[&[u32]])] = &[
    (5, &[&[3, 2], &[2, 3]]),
    (7, &[&[3, 2, 2], &[2, 2, 3], &[2, 3, 2]]),
    (9, &[&[2, 2, 2, 3], &[3, 2, 2, 2], &[2, 3, 2, 2], &[2, 2, 3, 2]]),
    (11, &[&[3, 3, 3, 2], &[2, 3, 3, 3], &[3, 2, 3, 3], &[3, 3, 2, 3]]),
];

/// A derived description of one measure: how many primary beats it has, how
/// it classifies, and (for compound/asymmetric meters) how its eighths group.
/// Recomputed whenever numerator, denominator, or grouping change; callers
/// must reset their tick cursor afterwards since tick semantics change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
    pub beat_count: u32,
    pub kind: MeterKind,
    /// Eighth-note group sizes summing to the numerator. Empty for simple
    /// meters; `beat_count` copies of 3 for compound meters.
    pub grouping: Vec<u32>,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::derive(4, 4, None)
    }
}

impl TimeSignature {
    /// Derive the canonical measure shape for `numerator/denominator`.
    ///
    /// Classification priority: compound (den 8, numerator a multiple of 3,
    /// at least 6), then asymmetric (den 8, numerator in the supported set),
    /// else simple. Unsupported denominator-8 numerators like 13/8 fall back
    /// to a flat simple grid rather than failing.
    ///
    /// A `custom_grouping` is honored only when it is one of the canonical
    /// options for that numerator; anything else gets the default.
    pub fn derive(numerator: u32, denominator: u32, custom_grouping: Option<&[u32]>) -> Self {
        if denominator == 8 && numerator % 3 == 0 && numerator >= 6 {
            let beat_count = numerator / 3;
            return Self {
                numerator,
                denominator,
                beat_count,
                kind: MeterKind::Compound,
                grouping: vec![3; beat_count as usize],
            };
        }

        if denominator == 8 {
            if let Some(options) = grouping_options(numerator) {
                let grouping = custom_grouping
                    .filter(|g| options.iter().any(|opt| opt == g))
                    .unwrap_or(options[0]);
                return Self {
                    numerator,
                    denominator,
                    beat_count: grouping.len() as u32,
                    kind: MeterKind::Asymmetric,
                    grouping: grouping.to_vec(),
                };
            }
        }

        Self {
            numerator,
            denominator,
            beat_count: numerator,
            kind: MeterKind::Simple,
            grouping: Vec::new(),
        }
    }

    /// Eighths per primary beat in a compound meter. Always 3.
    pub fn compound_subdivision_size(&self) -> u32 {
        3
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.numerator, self.denominator)
    }
}

/// The canonical grouping options for an asymmetric numerator, or `None` if
/// the numerator has no asymmetric support.
pub fn grouping_options(numerator: u32) -> Option<&'static [&'static [u32]]> {
    ASYMMETRIC_GROUPINGS
        .iter()
        .find(|(n, _)| *n == numerator)
        .map(|(_, opts)| *opts)
}
