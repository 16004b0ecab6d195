//! Discovery Scorer
//!
//! Turns a classifier's discovery probability into a YES/NO call with a
//! confidence band, rule-based strengths and weaknesses, and prioritized
//! recommendations with an estimated probability-point impact.

use serde::{Deserialize, Serialize};

use crate::types::{Confidence, DiscoveryScore, Priority, Recommendation};

/// Maximum strengths (and, separately, weaknesses) reported.
pub const MAX_FINDINGS: usize = 5;

/// Maximum recommendations reported.
pub const MAX_RECOMMENDATIONS: usize = 4;

/// Max-players range most often seen on featured maps.
pub const MAX_PLAYERS_SWEET_SPOT: std::ops::RangeInclusive<u32> = 16..=32;

/// Inputs to the discovery scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryFeatures {
    /// Mean CCU over the trailing 7 days
    pub avg_ccu_7d: f64,
    /// Growth over the window, in percent
    pub growth_rate: f64,
    pub xp_enabled: bool,
    pub creator_followers: u64,
    pub num_tags: u32,
    pub max_players: u32,
}

/// Stateless discovery scorer.
pub struct DiscoveryScorer;

impl DiscoveryScorer {
    /// Score a map given the classifier's probability in percent (0-100).
    pub fn score(features: &DiscoveryFeatures, probability: f64) -> DiscoveryScore {
        let probability = probability.clamp(0.0, 100.0);
        let prediction = if probability > 50.0 { "YES" } else { "NO" };

        DiscoveryScore {
            probability,
            prediction: prediction.to_string(),
            confidence: confidence(probability),
            strengths: Self::strengths(features),
            weaknesses: Self::weaknesses(features),
            recommendations: Self::recommendations(features),
        }
    }

    fn strengths(f: &DiscoveryFeatures) -> Vec<String> {
        let mut out = Vec::new();
        if f.avg_ccu_7d >= 300.0 {
            out.push(format!("Strong player base ({:.0} average CCU)", f.avg_ccu_7d));
        }
        if f.growth_rate > 10.0 {
            out.push(format!("Growing fast ({:+.1}% over 7 days)", f.growth_rate));
        }
        if f.xp_enabled {
            out.push("XP enabled".to_string());
        }
        if f.creator_followers > 10_000 {
            out.push(format!("Large creator audience ({} followers)", f.creator_followers));
        }
        out.truncate(MAX_FINDINGS);
        out
    }

    fn weaknesses(f: &DiscoveryFeatures) -> Vec<String> {
        let mut out = Vec::new();
        if f.avg_ccu_7d < 150.0 {
            out.push(format!("Low player base ({:.0} average CCU)", f.avg_ccu_7d));
        }
        if f.growth_rate < -5.0 {
            out.push(format!("Declining ({:+.1}% over 7 days)", f.growth_rate));
        }
        if !f.xp_enabled {
            out.push("XP not enabled".to_string());
        }
        if f.creator_followers < 1_000 {
            out.push(format!("Small creator audience ({} followers)", f.creator_followers));
        }
        out.truncate(MAX_FINDINGS);
        out
    }

    fn recommendations(f: &DiscoveryFeatures) -> Vec<Recommendation> {
        let mut out = Vec::new();
        if !f.xp_enabled {
            out.push(Recommendation {
                action: "Enable XP on the island".to_string(),
                estimated_impact: 15.0,
                priority: Priority::High,
            });
        }
        if f.num_tags < 3 {
            out.push(Recommendation {
                action: format!("Add more tags (currently {}, aim for at least 3)", f.num_tags),
                estimated_impact: 5.0,
                priority: Priority::Medium,
            });
        }
        if f.avg_ccu_7d < 300.0 {
            out.push(Recommendation {
                action: "Run a campaign to lift average CCU above 300".to_string(),
                estimated_impact: 20.0,
                priority: Priority::High,
            });
        }
        if !MAX_PLAYERS_SWEET_SPOT.contains(&f.max_players) {
            out.push(Recommendation {
                action: format!(
                    "Adjust max players to {}-{} (currently {})",
                    MAX_PLAYERS_SWEET_SPOT.start(),
                    MAX_PLAYERS_SWEET_SPOT.end(),
                    f.max_players
                ),
                estimated_impact: 8.0,
                priority: Priority::Medium,
            });
        }
        out.truncate(MAX_RECOMMENDATIONS);
        out
    }
}

/// Confidence band from the distance to the 50% decision boundary.
pub fn confidence(probability: f64) -> Confidence {
    let margin = (probability - 50.0).abs();
    if margin > 30.0 {
        Confidence::High
    } else if margin > 15.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Score a map given the classifier's probability in percent (0-100).
pub fn score_discovery(features: &DiscoveryFeatures, probability: f64) -> DiscoveryScore {
    DiscoveryScorer::score(features, probability)
}
