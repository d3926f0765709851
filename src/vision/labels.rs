use std::collections::VecDeque;

use serde::Deserialize;

/// Pixel adjacency used when grouping bright pixels into regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only (up, down, left, right).
    #[default]
    Four,
    /// Edge and corner neighbours.
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(i64, i64)] {
        const FOUR: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        const EIGHT: [(i64, i64); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// Connected regions of a boolean mask.
///
/// `labels[i] == 0` is background; regions are numbered `1..=count` in raster
/// order of their first pixel, so labelling is deterministic.
#[derive(Clone, Debug)]
pub struct ComponentLabels {
    pub labels: Vec<u32>,
    pub count: u32,
}

pub fn label_components(
    mask: &[bool],
    width: usize,
    height: usize,
    connectivity: Connectivity,
) -> ComponentLabels {
    debug_assert_eq!(mask.len(), width * height);
    let mut labels = vec![0u32; mask.len()];
    let mut count = 0u32;
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || labels[start] != 0 {
            continue;
        }
        count += 1;
        labels[start] = count;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let x = (idx % width) as i64;
            let y = (idx / width) as i64;
            for &(dx, dy) in connectivity.offsets() {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if mask[n] && labels[n] == 0 {
                    labels[n] = count;
                    queue.push_back(n);
                }
            }
        }
    }

    ComponentLabels { labels, count }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> (Vec<bool>, usize, usize) {
        let width = rows[0].len();
        let mask = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();
        (mask, width, rows.len())
    }

    #[test]
    fn diagonal_pixels_split_under_four_connectivity() {
        let (mask, w, h) = mask_from(&["#..", ".#.", "..#"]);
        assert_eq!(label_components(&mask, w, h, Connectivity::Four).count, 3);
        assert_eq!(label_components(&mask, w, h, Connectivity::Eight).count, 1);
    }

    #[test]
    fn labels_follow_raster_order() {
        let (mask, w, h) = mask_from(&["..##", "....", "#..."]);
        let out = label_components(&mask, w, h, Connectivity::Four);
        assert_eq!(out.count, 2);
        assert_eq!(out.labels[2], 1);
        assert_eq!(out.labels[3], 1);
        assert_eq!(out.labels[8], 2);
        assert_eq!(out.labels[0], 0);
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let out = label_components(&[false; 6], 3, 2, Connectivity::Eight);
        assert_eq!(out.count, 0);
        assert!(out.labels.iter().all(|&l| l == 0));
    }
}
