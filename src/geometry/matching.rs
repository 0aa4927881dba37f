use nalgebra::DMatrix;

/// Maximum-weight one-to-one assignment between rows and columns.
///
/// Solves the problem on a square matrix padded with zero weights so that
/// every row may also stay unmatched (Hungarian method with potentials,
/// O(n^3)). Negative entries therefore never win over leaving the row
/// empty. Entry `i` of the result is the column matched to row `i`, or
/// `None` if the row was matched to padding.
pub fn max_weight_assignment(weights: &DMatrix<f64>) -> Vec<Option<usize>> {
    let (rows, cols) = weights.shape();
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }

    let n = rows + cols;
    let base = weights.max().max(0.0);
    let cost = |i: usize, j: usize| -> f64 {
        if i < rows && j < cols {
            base - weights[(i, j)]
        } else {
            base
        }
    };

    // 1-based potentials; p[j] is the row currently matched to column j
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![None; rows];
    for j in 1..=n {
        let i = p[j];
        if i >= 1 && i <= rows && j <= cols {
            assignment[i - 1] = Some(j - 1);
        }
    }
    assignment
}

#[cfg(test)]
mod matching_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn total(weights: &DMatrix<f64>, assignment: &[Option<usize>]) -> f64 {
        assignment
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| weights[(i, j)]))
            .sum()
    }

    fn permutations(items: Vec<usize>) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items];
        }
        let mut out = Vec::new();
        for k in 0..items.len() {
            let mut rest = items.clone();
            let head = rest.remove(k);
            for mut tail in permutations(rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_beats_greedy_choice() {
        let weights = DMatrix::from_row_slice(2, 2, &[10.0, 9.0, 9.0, 1.0]);
        let assignment = max_weight_assignment(&weights);
        assert_eq!(assignment, vec![Some(1), Some(0)]);
        assert_relative_eq!(total(&weights, &assignment), 18.0);
    }

    #[test]
    fn test_matches_brute_force() {
        let weights = DMatrix::from_row_slice(
            4,
            4,
            &[
                7.0, 3.0, 0.0, 2.5, //
                1.0, 8.0, 4.0, 0.0, //
                6.5, 6.0, 2.0, 9.0, //
                0.0, 5.0, 7.5, 3.0,
            ],
        );
        let best = permutations((0..4).collect())
            .into_iter()
            .map(|perm| perm.iter().enumerate().map(|(i, &j)| weights[(i, j)]).sum::<f64>())
            .fold(f64::NEG_INFINITY, f64::max);

        let assignment = max_weight_assignment(&weights);
        assert!(assignment.iter().all(|j| j.is_some()));
        assert_relative_eq!(total(&weights, &assignment), best, epsilon = 1e-12);
    }

    #[test]
    fn test_rectangular_problems() {
        // more columns than rows: every row gets a distinct real column
        let wide = DMatrix::from_row_slice(2, 3, &[1.0, 5.0, 2.0, 4.0, 6.0, 0.0]);
        let assignment = max_weight_assignment(&wide);
        assert_eq!(assignment, vec![Some(1), Some(0)]);

        // more rows than columns: one row is left on padding
        let tall = wide.transpose();
        let assignment = max_weight_assignment(&tall);
        assert_eq!(assignment.iter().filter(|j| j.is_some()).count(), 2);
        assert_relative_eq!(total(&tall, &assignment), 9.0);
        assert_eq!(assignment[2], None);
    }

    #[test]
    fn test_negative_cells_are_never_chosen() {
        // a full square of forbidden cells except one
        let weights = DMatrix::from_row_slice(2, 2, &[-1.0, 1e-9, -1.0, -1.0]);
        assert_eq!(max_weight_assignment(&weights), vec![Some(1), None]);
    }

    #[test]
    fn test_empty_matrix() {
        let weights = DMatrix::<f64>::zeros(3, 0);
        assert_eq!(max_weight_assignment(&weights), vec![None; 3]);
    }
}
