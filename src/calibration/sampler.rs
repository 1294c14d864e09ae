//! Stratified reference-guild sampling for one climate tier
//!
//! Strata:
//! - climate-compatible: an anchor plant plus co-members whose temperature
//!   and precipitation envelopes overlap the anchor's
//! - pure random: uniform without replacement (edge-case coverage)
//! - phylogenetically stratified: same-family, random and distinct-family
//!   guilds spanning low to high evolutionary distance
//! - monoculture: same genus, padded from the same family
//!
//! Every draw comes from one seeded `ChaCha8Rng` stream, so a tier's guild
//! list is a pure function of `(seed, tier position, pool)`.

use crate::config::{SizeRange, StratumMix};
use crate::data::Plant;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Anchor attempts before a climate-compatible draw falls back to random
pub const ANCHOR_ATTEMPTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stratum {
    ClimateCompatible,
    PureRandom,
    PhyloStratified,
    Monoculture,
}

/// Number of guilds per stratum for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StratumCounts {
    pub climate_compatible: usize,
    pub pure_random: usize,
    pub phylo_stratified: usize,
    pub monoculture: usize,
}

impl StratumCounts {
    /// `round(N·f)` for the first three strata; monocultures take the remainder
    pub fn from_mix(n_guilds: usize, mix: &StratumMix) -> Self {
        let mut remaining = n_guilds;
        let mut take = |fraction: f64| {
            let count = ((n_guilds as f64 * fraction).round() as usize).min(remaining);
            remaining -= count;
            count
        };
        let climate_compatible = take(mix.climate_compatible);
        let pure_random = take(mix.pure_random);
        let phylo_stratified = take(mix.phylo_stratified);
        Self {
            climate_compatible,
            pure_random,
            phylo_stratified,
            monoculture: remaining,
        }
    }

    pub fn total(&self) -> usize {
        self.climate_compatible + self.pure_random + self.phylo_stratified + self.monoculture
    }
}

/// Candidate plants of one tier with family and genus indexes
#[derive(Debug, Clone)]
pub struct TierPool<'a> {
    plants: Vec<&'a Plant>,
    by_family: BTreeMap<&'a str, Vec<usize>>,
    by_genus: BTreeMap<&'a str, Vec<usize>>,
}

impl<'a> TierPool<'a> {
    /// Pool sorted by plant id, so sampling never depends on load order
    pub fn new(mut plants: Vec<&'a Plant>) -> Self {
        plants.sort_by(|a, b| a.id.cmp(&b.id));
        let mut by_family: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut by_genus: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, plant) in plants.iter().enumerate() {
            if !plant.family.is_empty() {
                by_family.entry(plant.family.as_str()).or_default().push(idx);
            }
            if !plant.genus.is_empty() {
                by_genus.entry(plant.genus.as_str()).or_default().push(idx);
            }
        }
        Self {
            plants,
            by_family,
            by_genus,
        }
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    pub fn plant(&self, idx: usize) -> &'a Plant {
        self.plants[idx]
    }

    pub fn num_families(&self) -> usize {
        self.by_family.len()
    }
}

/// Draws reference guilds for one tier
pub struct GuildSampler<'a> {
    pool: TierPool<'a>,
    rng: ChaCha8Rng,
}

impl<'a> GuildSampler<'a> {
    pub fn new(pool: TierPool<'a>, seed: u64) -> Self {
        Self {
            pool,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn pool(&self) -> &TierPool<'a> {
        &self.pool
    }

    /// Sample every stratum in order; each guild is a list of plant ids
    ///
    /// `size` is either fixed or drawn per guild from an inclusive range
    /// (capped at the pool size).
    pub fn sample(&mut self, counts: &StratumCounts, size: GuildSize) -> Vec<(Stratum, Vec<String>)> {
        let mut guilds = Vec::with_capacity(counts.total());

        for _ in 0..counts.climate_compatible {
            let k = self.guild_size(size);
            let guild = self.climate_compatible(k);
            guilds.push((Stratum::ClimateCompatible, guild));
        }

        for _ in 0..counts.pure_random {
            let k = self.guild_size(size);
            let guild = self.pure_random(k);
            guilds.push((Stratum::PureRandom, guild));
        }

        // First third low diversity, then alternate medium and high
        let low = counts.phylo_stratified / 3;
        for i in 0..counts.phylo_stratified {
            let k = self.guild_size(size);
            let guild = if i < low {
                self.same_family(k)
            } else if (i - low) % 2 == 0 {
                self.pure_random(k)
            } else {
                self.distinct_families(k)
            };
            guilds.push((Stratum::PhyloStratified, guild));
        }

        for _ in 0..counts.monoculture {
            let k = self.guild_size(size);
            let guild = self.monoculture(k);
            guilds.push((Stratum::Monoculture, guild));
        }

        guilds
    }

    fn guild_size(&mut self, size: GuildSize) -> usize {
        match size {
            GuildSize::Fixed(k) => k.min(self.pool.len()),
            GuildSize::Range(range) => {
                let max = range.max.min(self.pool.len());
                let min = range.min.min(max);
                self.rng.gen_range(min..=max)
            }
        }
    }

    fn ids(&self, indices: impl IntoIterator<Item = usize>) -> Vec<String> {
        indices.into_iter().map(|i| self.pool.plants[i].id.clone()).collect()
    }

    pub fn pure_random(&mut self, k: usize) -> Vec<String> {
        let all: Vec<usize> = (0..self.pool.len()).collect();
        let chosen: Vec<usize> = all.choose_multiple(&mut self.rng, k).copied().collect();
        self.ids(chosen)
    }

    /// Anchor plus members whose envelopes strictly overlap the anchor's
    pub fn climate_compatible(&mut self, k: usize) -> Vec<String> {
        let n = self.pool.len();
        if n == 0 || k == 0 {
            return Vec::new();
        }
        for _ in 0..ANCHOR_ATTEMPTS {
            let anchor = self.rng.gen_range(0..n);
            let Some(anchor_env) = self.pool.plants[anchor].envelope.as_ref() else {
                continue;
            };
            let compatible: Vec<usize> = (0..n)
                .filter(|&i| i != anchor)
                .filter(|&i| {
                    self.pool.plants[i]
                        .envelope
                        .as_ref()
                        .is_some_and(|env| env.overlaps(anchor_env))
                })
                .collect();
            if compatible.len() + 1 < k {
                continue;
            }
            let mut guild = vec![anchor];
            guild.extend(compatible.choose_multiple(&mut self.rng, k - 1).copied());
            return self.ids(guild);
        }
        self.pure_random(k)
    }

    /// Low diversity: k members of one family
    pub fn same_family(&mut self, k: usize) -> Vec<String> {
        let eligible: Vec<&Vec<usize>> = self
            .pool
            .by_family
            .values()
            .filter(|members| members.len() >= k)
            .collect();
        let Some(members) = eligible.choose(&mut self.rng) else {
            return self.pure_random(k);
        };
        let chosen: Vec<usize> = members.choose_multiple(&mut self.rng, k).copied().collect();
        self.ids(chosen)
    }

    /// High diversity: one plant from each of k different families
    pub fn distinct_families(&mut self, k: usize) -> Vec<String> {
        if self.pool.num_families() < k {
            return self.pure_random(k);
        }
        let families: Vec<&Vec<usize>> = self.pool.by_family.values().collect();
        let picked: Vec<&Vec<usize>> = families.choose_multiple(&mut self.rng, k).copied().collect();
        let mut chosen = Vec::with_capacity(k);
        for members in picked {
            if let Some(&idx) = members.choose(&mut self.rng) {
                chosen.push(idx);
            }
        }
        self.ids(chosen)
    }

    /// Near-monoculture: one genus, padded from its family, then the pool
    pub fn monoculture(&mut self, k: usize) -> Vec<String> {
        let eligible: Vec<&Vec<usize>> = self
            .pool
            .by_genus
            .values()
            .filter(|members| members.len() >= 2)
            .collect();
        let Some(genus_members) = eligible.choose(&mut self.rng) else {
            return self.pure_random(k);
        };
        let mut chosen: Vec<usize> = genus_members
            .choose_multiple(&mut self.rng, k.min(genus_members.len()))
            .copied()
            .collect();

        if chosen.len() < k {
            let family = self.pool.plants[chosen[0]].family.as_str();
            let family_rest: Vec<usize> = self
                .pool
                .by_family
                .get(family)
                .map(|members| members.iter().copied().filter(|i| !chosen.contains(i)).collect())
                .unwrap_or_default();
            let need = k - chosen.len();
            chosen.extend(family_rest.choose_multiple(&mut self.rng, need).copied());
        }

        if chosen.len() < k {
            let rest: Vec<usize> = (0..self.pool.len()).filter(|i| !chosen.contains(i)).collect();
            let need = k - chosen.len();
            chosen.extend(rest.choose_multiple(&mut self.rng, need).copied());
        }

        self.ids(chosen)
    }
}

/// Guild size policy of a calibration run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuildSize {
    Fixed(usize),
    Range(SizeRange),
}

impl GuildSize {
    /// Smallest guild a tier pool must be able to supply
    pub fn min(&self) -> usize {
        match self {
            GuildSize::Fixed(k) => *k,
            GuildSize::Range(range) => range.min,
        }
    }

    pub fn max(&self) -> usize {
        match self {
            GuildSize::Fixed(k) => *k,
            GuildSize::Range(range) => range.max,
        }
    }
}
