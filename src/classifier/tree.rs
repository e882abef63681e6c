use rand::Rng;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features drawn per split; `None` considers all of them.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// CART tree grown by variance reduction. On 0/1 targets the variance split
/// criterion ranks splits exactly like Gini impurity, so the same tree serves
/// the forest and the boosting residuals.
#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    root: Node,
}

struct Grower<'a, R: Rng, F: Fn(&[usize]) -> f64> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a TreeParams,
    rng: &'a mut R,
    leaf_value: F,
}

impl RegressionTree {
    /// Grows a tree over `indices` (duplicates allowed, as in a bootstrap
    /// sample). `leaf_value` turns the indices reaching a leaf into its output.
    pub fn fit<R: Rng, F: Fn(&[usize]) -> f64>(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut R,
        leaf_value: F,
    ) -> Self {
        let mut grower = Grower {
            rows,
            targets,
            params,
            rng,
            leaf_value,
        };
        let root = grower.grow(indices.to_vec(), 0);
        Self { root }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<R: Rng, F: Fn(&[usize]) -> f64> Grower<'_, R, F> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> Node {
        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || self.is_pure(&indices)
        {
            return self.leaf(&indices);
        }

        let Some(best) = self.best_split(&indices) else {
            return self.leaf(&indices);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.rows[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn leaf(&self, indices: &[usize]) -> Node {
        Node::Leaf {
            value: (self.leaf_value)(indices),
        }
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        let first = self.targets[indices[0]];
        indices.iter().all(|&i| (self.targets[i] - first).abs() < f64::EPSILON)
    }

    fn best_split(&mut self, indices: &[usize]) -> Option<Candidate> {
        let width = self.rows[indices[0]].len();
        let draw = self.params.max_features.unwrap_or(width).clamp(1, width);
        // Random feature order also settles ties between equally good splits.
        let features = rand::seq::index::sample(&mut *self.rng, width, draw).into_vec();

        let n = indices.len() as f64;
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.targets[i].powi(2)).sum();
        let parent_sse = total_sq - total * total / n;

        let mut best: Option<Candidate> = None;
        let mut order = indices.to_vec();

        for feature in features {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for split in 1..order.len() {
                let moved = self.targets[order[split - 1]];
                left_sum += moved;
                left_sq += moved * moved;

                let below = self.rows[order[split - 1]][feature];
                let above = self.rows[order[split]][feature];
                if below >= above {
                    continue;
                }

                let left_n = split as f64;
                let right_n = n - left_n;
                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n)
                    + (right_sq - right_sum * right_sum / right_n);
                let gain = parent_sse - sse;

                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: (below + above) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

pub(crate) fn mean_target(targets: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
}
