//! Trigger conditions evaluated over the sliding window.

use std::collections::VecDeque;

use crate::payload::{ChannelId, Hit};

/// Decides when the window content forms a trigger.
pub trait WindowCondition: Send {
    /// Returns true if `window` meets the condition.
    fn is_met(&self, window: &VecDeque<Hit>) -> bool;

    /// Minimum number of hits the condition needs.
    fn threshold(&self) -> usize;

    /// Chooses the hits of a finished trigger that go into the request.
    fn select(&self, trigger: Vec<Hit>) -> Vec<Hit> {
        trigger
    }
}

/// At least `threshold` hits in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplicity {
    threshold: usize,
}

impl Multiplicity {
    /// Creates the condition.
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl WindowCondition for Multiplicity {
    #[inline]
    fn is_met(&self, window: &VecDeque<Hit>) -> bool {
        !window.is_empty() && window.len() >= self.threshold
    }

    fn threshold(&self) -> usize {
        self.threshold
    }
}

/// At least `threshold` hits in the neighbourhood of some window hit.
///
/// Two channels are neighbours when their strings differ by at most
/// `string_radius` and their positions by at most `coherence_length`. A
/// hit counts itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterCondition {
    threshold: usize,
    coherence_length: u8,
    string_radius: u16,
}

impl ClusterCondition {
    /// Creates the condition.
    #[must_use]
    pub const fn new(threshold: usize, coherence_length: u8, string_radius: u16) -> Self {
        Self {
            threshold,
            coherence_length,
            string_radius,
        }
    }

    /// Returns true if `a` and `b` are neighbours.
    #[inline]
    #[must_use]
    pub fn is_neighbour(&self, a: ChannelId, b: ChannelId) -> bool {
        a.string.abs_diff(b.string) <= self.string_radius
            && a.position.abs_diff(b.position) <= self.coherence_length
    }

    fn neighbours<'a>(&self, center: &Hit, hits: impl Iterator<Item = &'a Hit>) -> usize {
        hits.filter(|h| self.is_neighbour(center.channel, h.channel))
            .count()
    }

    fn is_center<'a, I>(&self, center: &Hit, hits: I) -> bool
    where
        I: Iterator<Item = &'a Hit>,
    {
        self.neighbours(center, hits) >= self.threshold
    }
}

impl WindowCondition for ClusterCondition {
    fn is_met(&self, window: &VecDeque<Hit>) -> bool {
        !window.is_empty() && window.iter().any(|c| self.is_center(c, window.iter()))
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    /// Keeps only hits neighbouring a cluster center.
    fn select(&self, trigger: Vec<Hit>) -> Vec<Hit> {
        let centers: Vec<ChannelId> = trigger
            .iter()
            .filter(|c| self.is_center(c, trigger.iter()))
            .map(|c| c.channel)
            .collect();
        trigger
            .into_iter()
            .filter(|h| centers.iter().any(|c| self.is_neighbour(*c, h.channel)))
            .collect()
    }
}
