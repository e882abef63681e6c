use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::models::Schema;

/// K-means with k-means++ seeding and several restarts; the restart with the
/// lowest inertia wins. Cluster ids carry no ordering.
#[derive(Debug, Clone)]
pub struct RiskClusterer {
    k: usize,
    restarts: usize,
    max_iter: usize,
    seed: u64,
}

#[derive(Debug, Clone)]
/// Cluster ids in the row order of the clustered dataset. Student ids ride
/// along for display only; lookups go by row position.
pub struct ClusterAssignment {
    k: usize,
    labels: Vec<(Uuid, usize)>,
    inertia: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub mean_score: f64,
}

impl RiskClusterer {
    pub fn new(k: usize, restarts: usize, max_iter: usize, seed: u64) -> Result<Self> {
        if k == 0 || restarts == 0 || max_iter == 0 {
            return Err(PipelineError::Configuration(format!(
                "clustering needs positive k, restarts and iterations (got {k}, {restarts}, {max_iter})"
            )));
        }
        Ok(Self {
            k,
            restarts,
            max_iter,
            seed,
        })
    }

    /// Clusters every row of `dataset` on the raw `schema` columns.
    pub fn fit_predict(&self, dataset: &Dataset, schema: &Schema) -> Result<ClusterAssignment> {
        let x = dataset.matrix(schema)?;
        if x.len() < self.k {
            return Err(PipelineError::Configuration(format!(
                "cannot form {} clusters from {} rows",
                self.k,
                x.len()
            )));
        }

        let (labels, inertia) = self.cluster_rows(x.rows());
        tracing::debug!(k = self.k, inertia, "clustering converged");

        let labels: Vec<(Uuid, usize)> = dataset
            .rows()
            .iter()
            .zip(labels)
            .map(|(row, label)| (row.student_id, label))
            .collect();
        Ok(ClusterAssignment {
            k: self.k,
            labels,
            inertia,
        })
    }

    fn cluster_rows(&self, rows: &[Vec<f64>]) -> (Vec<usize>, f64) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best = self.restart(rows, &mut rng);
        for _ in 1..self.restarts {
            let candidate = self.restart(rows, &mut rng);
            if candidate.1 < best.1 {
                best = candidate;
            }
        }
        best
    }

    fn restart(&self, rows: &[Vec<f64>], rng: &mut StdRng) -> (Vec<usize>, f64) {
        let centroids = self.seed_centroids(rows, rng);
        self.lloyd(rows, centroids)
    }

    /// k-means++: each new centroid is drawn with probability proportional to
    /// its squared distance from the nearest centroid already chosen.
    fn seed_centroids(&self, rows: &[Vec<f64>], rng: &mut StdRng) -> Vec<Vec<f64>> {
        let mut centroids = vec![rows[rng.random_range(0..rows.len())].clone()];
        while centroids.len() < self.k {
            let distances: Vec<f64> = rows
                .iter()
                .map(|row| nearest(row, &centroids).1)
                .collect();
            let total: f64 = distances.iter().sum();
            let pick = if total <= 0.0 {
                rng.random_range(0..rows.len())
            } else {
                let mut target = rng.random::<f64>() * total;
                let mut chosen = rows.len() - 1;
                for (i, d) in distances.iter().enumerate() {
                    if target < *d {
                        chosen = i;
                        break;
                    }
                    target -= d;
                }
                chosen
            };
            centroids.push(rows[pick].clone());
        }
        centroids
    }

    fn lloyd(&self, rows: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> (Vec<usize>, f64) {
        let width = rows[0].len();
        let mut labels: Vec<usize> = rows.iter().map(|row| nearest(row, &centroids).0).collect();

        for _ in 0..self.max_iter {
            let mut sums = vec![vec![0.0; width]; self.k];
            let mut counts = vec![0usize; self.k];
            for (row, &label) in rows.iter().zip(&labels) {
                counts[label] += 1;
                for (s, v) in sums[label].iter_mut().zip(row) {
                    *s += v;
                }
            }
            for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(&counts) {
                // An emptied cluster keeps its previous centre.
                if *count > 0 {
                    *centroid = sum.into_iter().map(|s| s / *count as f64).collect();
                }
            }

            let next: Vec<usize> = rows.iter().map(|row| nearest(row, &centroids).0).collect();
            if next == labels {
                break;
            }
            labels = next;
        }

        let inertia = rows.iter().map(|row| nearest(row, &centroids).1).sum();
        (labels, inertia)
    }
}

/// Index of and squared distance to the closest centroid; ties go to the
/// lowest index.
fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let distance: f64 = row.iter().zip(centroid).map(|(a, b)| (a - b).powi(2)).sum();
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

impl ClusterAssignment {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn labels(&self) -> &[(Uuid, usize)] {
        &self.labels
    }

    /// Cluster of the row at `position` in the clustered dataset.
    pub fn cluster_at(&self, position: usize) -> Option<usize> {
        self.labels.get(position).map(|(_, label)| *label)
    }

    /// Fails unless `dataset` has exactly the rows this assignment was built from.
    pub fn ensure_covers(&self, dataset: &Dataset) -> Result<()> {
        let matches = dataset.len() == self.labels.len()
            && dataset
                .rows()
                .iter()
                .zip(&self.labels)
                .all(|(row, (student_id, _))| row.student_id == *student_id);
        if !matches {
            return Err(PipelineError::Configuration(format!(
                "cluster assignment over {} rows does not match dataset {} ({} rows)",
                self.labels.len(),
                dataset.name(),
                dataset.len()
            )));
        }
        Ok(())
    }

    pub fn distinct_clusters(&self) -> usize {
        self.labels
            .iter()
            .map(|(_, label)| *label)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Size and mean burnout score per cluster id, in id order.
    pub fn profiles(&self, dataset: &Dataset) -> Result<Vec<ClusterProfile>> {
        self.ensure_covers(dataset)?;
        let mut totals = vec![(0usize, 0u64); self.k];
        for (row, (_, cluster)) in dataset.rows().iter().zip(&self.labels) {
            totals[*cluster].0 += 1;
            totals[*cluster].1 += u64::from(row.burnout_score);
        }
        Ok(totals
            .into_iter()
            .enumerate()
            .map(|(cluster, (size, score_total))| ClusterProfile {
                cluster,
                size,
                mean_score: if size == 0 {
                    0.0
                } else {
                    score_total as f64 / size as f64
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetBuilder;
    use crate::models::{FeatureRow, StudentRecord};
    use crate::source::{DataSource, SyntheticSource};

    fn population() -> Dataset {
        let records = SyntheticSource::new(100, 42).load().unwrap();
        DatasetBuilder::new("current", Schema::current()).build(records)
    }

    #[test]
    fn same_seed_same_assignment() {
        let dataset = population();
        let clusterer = RiskClusterer::new(3, 10, 300, 42).unwrap();
        let first = clusterer.fit_predict(&dataset, &Schema::current()).unwrap();
        let second = clusterer.fit_predict(&dataset, &Schema::current()).unwrap();
        assert_eq!(first.labels(), second.labels());
        assert_eq!(first.inertia(), second.inertia());
        assert!(first.distinct_clusters() <= 3);
        assert!(first.labels().iter().all(|(_, label)| *label < 3));
    }

    #[test]
    fn separates_obvious_groups() {
        let mut records = Vec::new();
        for i in 0..30u128 {
            let (pending, completion) = match i % 3 {
                0 => (0, 100),
                1 => (7, 60),
                _ => (14, 20),
            };
            records.push(StudentRecord {
                student_id: Uuid::from_u128(i),
                features: FeatureRow::new(pending, 0, 0, completion, 5).unwrap(),
                historical_label: None,
            });
        }
        let dataset = DatasetBuilder::new("groups", Schema::current()).build(records);
        let assignment = RiskClusterer::new(3, 5, 100, 7)
            .unwrap()
            .fit_predict(&dataset, &Schema::current())
            .unwrap();

        assert_eq!(assignment.distinct_clusters(), 3);
        assert!(assignment.inertia() < 1e-9);
        let first = assignment.cluster_at(0).unwrap();
        assert_eq!(assignment.cluster_at(3), Some(first));
        assert_ne!(assignment.cluster_at(1), Some(first));
        assert_eq!(assignment.cluster_at(30), None);

        let profiles = assignment.profiles(&dataset).unwrap();
        assert_eq!(profiles.iter().map(|p| p.size).sum::<usize>(), 30);
        assert!(profiles.iter().all(|p| p.size == 10));
    }

    #[test]
    fn duplicate_rows_leave_clusters_empty_but_valid() {
        let records = (0..6u128)
            .map(|i| StudentRecord {
                student_id: Uuid::from_u128(i),
                features: FeatureRow::new(2, 1, 1, 80, 4).unwrap(),
                historical_label: None,
            })
            .collect();
        let dataset = DatasetBuilder::new("same", Schema::current()).build(records);
        let assignment = RiskClusterer::new(3, 3, 50, 1)
            .unwrap()
            .fit_predict(&dataset, &Schema::current())
            .unwrap();
        assert_eq!(assignment.distinct_clusters(), 1);
        assert_eq!(assignment.profiles(&dataset).unwrap().len(), 3);
    }

    #[test]
    fn repeated_student_ids_are_profiled_by_position() {
        let records = (0..10)
            .map(|i| StudentRecord {
                student_id: Uuid::from_u128(7),
                features: if i < 5 {
                    FeatureRow::new(0, 0, 0, 100, 1).unwrap()
                } else {
                    FeatureRow::new(14, 7, 9, 20, 29).unwrap()
                },
                historical_label: None,
            })
            .collect();
        let dataset = DatasetBuilder::new("csv", Schema::current()).build(records);
        let assignment = RiskClusterer::new(2, 5, 100, 3)
            .unwrap()
            .fit_predict(&dataset, &Schema::current())
            .unwrap();

        let low = assignment.cluster_at(0).unwrap();
        let high = assignment.cluster_at(9).unwrap();
        assert_ne!(low, high);
        let profiles = assignment.profiles(&dataset).unwrap();
        assert_eq!(profiles[low].size, 5);
        assert_eq!(profiles[high].size, 5);
        assert!((profiles[low].mean_score - 5.0).abs() < 1e-9);
        assert!((profiles[high].mean_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn profiles_reject_a_different_dataset() {
        let dataset = population();
        let assignment = RiskClusterer::new(3, 2, 50, 42)
            .unwrap()
            .fit_predict(&dataset, &Schema::current())
            .unwrap();
        let other = DatasetBuilder::new("other", Schema::current())
            .build(SyntheticSource::new(10, 9).load().unwrap());
        assert!(matches!(
            assignment.profiles(&other),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(RiskClusterer::new(0, 10, 300, 42).is_err());
        let dataset = population();
        let too_many = RiskClusterer::new(101, 1, 10, 42).unwrap();
        assert!(matches!(
            too_many.fit_predict(&dataset, &Schema::current()),
            Err(PipelineError::Configuration(_))
        ));
    }
}
