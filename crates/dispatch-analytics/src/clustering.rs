//! Route load tiers.
//!
//! Routes (flight numbers) are clustered on their standardized mean load with
//! k-means (k = 3, k-means++ seeding, several seeded restarts). Centroids are
//! then ranked to name the tiers, so tier names never depend on which label
//! the optimizer happened to assign.

use dispatch_domain::{ClusterAssignment, FlightTable, LoadTier};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::aggregation::route_profiles;
use crate::config::ClusteringConfig;
use crate::error::{AnalyticsError, Result};
use crate::stats::standardizer;

const K: usize = 3;

/// Cluster centre in passenger units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// k-means label
    pub cluster_id: usize,
    /// Centre in mean passengers per departure
    pub mean_passengers: f64,
    /// Tier assigned by centre rank
    pub tier: LoadTier,
}

/// Outcome of route clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteClusters {
    /// One entry per route, ordered by flight number
    pub assignments: Vec<ClusterAssignment>,
    /// Exactly three centroids, ascending by load
    pub centroids: Vec<Centroid>,
    /// Within-cluster sum of squares in standardized units
    pub inertia: f64,
}

impl RouteClusters {
    /// Routes assigned to `tier`.
    pub fn routes_in(&self, tier: LoadTier) -> impl Iterator<Item = &ClusterAssignment> {
        self.assignments.iter().filter(move |a| a.tier == tier)
    }
}

#[derive(Debug, Clone)]
struct KMeansFit {
    labels: Vec<usize>,
    centers: Vec<f64>,
    inertia: f64,
}

/// Cluster routes of `table` into low, medium and high load tiers.
pub fn cluster_routes(table: &FlightTable, config: &ClusteringConfig) -> Result<RouteClusters> {
    if table.is_empty() {
        return Err(AnalyticsError::EmptyFilterResult);
    }
    let profiles = route_profiles(table)?;
    if profiles.len() < K {
        return Err(AnalyticsError::InsufficientRoutes {
            required: K,
            available: profiles.len(),
        });
    }

    let loads: Vec<f64> = profiles.iter().map(|p| p.mean_passengers).collect();
    let (mean, std) = standardizer(&loads);
    let points: Vec<f64> = loads.iter().map(|v| (v - mean) / std).collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<KMeansFit> = None;
    for _ in 0..config.n_init.max(1) {
        let seeds = kmeans_plus_plus(&points, K, &mut rng);
        let fit = lloyd(&points, seeds, config.max_iter, config.tolerance);
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    let fit = best.ok_or_else(|| AnalyticsError::AnalysisFailed("no k-means run".into()))?;
    let fit = fill_empty_clusters(&points, fit);

    // Rank centroids ascending, ties by cluster id
    let mut order: Vec<usize> = (0..K).collect();
    order.sort_by(|&a, &b| {
        fit.centers[a]
            .total_cmp(&fit.centers[b])
            .then(a.cmp(&b))
    });
    let mut tiers = [LoadTier::Low; K];
    for (rank, &cluster) in order.iter().enumerate() {
        tiers[cluster] = LoadTier::ASCENDING[rank];
    }

    let centroids = order
        .iter()
        .map(|&cluster| Centroid {
            cluster_id: cluster,
            mean_passengers: fit.centers[cluster] * std + mean,
            tier: tiers[cluster],
        })
        .collect();

    let assignments = profiles
        .into_iter()
        .zip(&fit.labels)
        .map(|(profile, &label)| ClusterAssignment {
            flight_no: profile.flight_no,
            mean_passengers: profile.mean_passengers,
            cluster_id: label,
            tier: tiers[label],
        })
        .collect();

    tracing::debug!(
        routes = points.len(),
        inertia = fit.inertia,
        seed = config.seed,
        "Clustered routes by load"
    );

    Ok(RouteClusters {
        assignments,
        centroids,
        inertia: fit.inertia,
    })
}

fn nearest(point: f64, centers: &[f64]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, (point - c).powi(2)))
        .fold((0, f64::INFINITY), |best, cur| {
            if cur.1 < best.1 { cur } else { best }
        })
}

fn kmeans_plus_plus(points: &[f64], k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);

    while centers.len() < k {
        let weights: Vec<f64> = points.iter().map(|&p| nearest(p, &centers).1).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            centers.push(points[rng.gen_range(0..points.len())]);
            continue;
        }

        let target = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        let mut chosen = points.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if cumulative > target {
                chosen = i;
                break;
            }
        }
        centers.push(points[chosen]);
    }
    centers
}

fn assign(points: &[f64], centers: &[f64]) -> (Vec<usize>, f64) {
    let mut inertia = 0.0;
    let labels = points
        .iter()
        .map(|&p| {
            let (label, dist) = nearest(p, centers);
            inertia += dist;
            label
        })
        .collect();
    (labels, inertia)
}

fn means(points: &[f64], labels: &[usize], previous: &[f64]) -> Vec<f64> {
    let mut sums = vec![0.0; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (&p, &label) in points.iter().zip(labels) {
        sums[label] += p;
        counts[label] += 1;
    }
    (0..previous.len())
        .map(|c| {
            if counts[c] == 0 {
                previous[c]
            } else {
                sums[c] / counts[c] as f64
            }
        })
        .collect()
}

fn lloyd(points: &[f64], mut centers: Vec<f64>, max_iter: usize, tolerance: f64) -> KMeansFit {
    for _ in 0..max_iter {
        let (labels, _) = assign(points, &centers);
        let updated = means(points, &labels, &centers);
        let shift: f64 = updated
            .iter()
            .zip(&centers)
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        centers = updated;
        if shift <= tolerance {
            break;
        }
    }
    let (labels, inertia) = assign(points, &centers);
    KMeansFit {
        labels,
        centers,
        inertia,
    }
}

/// Move the farthest point of the largest cluster into each empty cluster.
fn fill_empty_clusters(points: &[f64], mut fit: KMeansFit) -> KMeansFit {
    let k = fit.centers.len();
    loop {
        let mut counts = vec![0usize; k];
        for &label in &fit.labels {
            counts[label] += 1;
        }
        let Some(empty) = counts.iter().position(|&c| c == 0) else {
            break;
        };
        let largest = (0..k).max_by_key(|&c| (counts[c], std::cmp::Reverse(c))).unwrap_or(0);
        if counts[largest] < 2 {
            break;
        }

        let farthest = fit
            .labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == largest)
            .map(|(i, _)| (i, (points[i] - fit.centers[largest]).abs()))
            .fold(None, |best: Option<(usize, f64)>, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        let Some((index, _)) = farthest else {
            break;
        };

        tracing::debug!(cluster = empty, point = index, "Refilled empty cluster");
        fit.labels[index] = empty;
        fit.centers[empty] = points[index];
        fit.centers = means(points, &fit.labels, &fit.centers);
    }

    let inertia = points
        .iter()
        .zip(&fit.labels)
        .map(|(p, &label)| (p - fit.centers[label]).powi(2))
        .sum();
    fit.inertia = inertia;
    fit
}
