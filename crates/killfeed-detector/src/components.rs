//! 8-connected component labelling over row runs.

#[derive(Clone, Copy)]
struct RowRun {
    start: usize,
    end: usize,
    row: usize,
    label: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Component {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub pixels: usize,
    pub luma_sum: u64,
}

impl Component {
    pub fn mean_luma(&self) -> f64 {
        if self.pixels == 0 {
            return 0.0;
        }
        self.luma_sum as f64 / self.pixels as f64
    }
}

#[derive(Clone, Copy)]
struct ComponentStats {
    pixels: usize,
    luma_sum: u64,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
}

impl ComponentStats {
    fn new(x: usize, y: usize) -> Self {
        Self {
            pixels: 0,
            luma_sum: 0,
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }
}

/// Labels the non-zero pixels of `mask`; `luma` has the same layout and
/// feeds each component's brightness sum. Components come back in order of
/// their first run (top-to-bottom, left-to-right).
pub(crate) fn connected_components(
    mask: &[u8],
    luma: &[u8],
    width: usize,
    height: usize,
) -> Vec<Component> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut runs = Vec::new();
    let mut offsets = vec![0usize; height + 1];
    for row in 0..height {
        offsets[row] = runs.len();
        let row_data = &mask[row * width..(row + 1) * width];
        let mut x = 0usize;
        while x < width {
            while x < width && row_data[x] == 0 {
                x += 1;
            }
            if x >= width {
                break;
            }
            let start = x;
            while x < width && row_data[x] != 0 {
                x += 1;
            }
            runs.push(RowRun {
                start,
                end: x,
                row,
                label: 0,
            });
        }
    }
    offsets[height] = runs.len();

    if runs.is_empty() {
        return Vec::new();
    }

    let mut dsu = DisjointSet::new();
    for run in runs.iter_mut() {
        run.label = dsu.make_set();
    }

    for row in 1..height {
        let mut prev = offsets[row - 1];
        let prev_end = offsets[row];
        let mut curr = offsets[row];
        let curr_end = offsets[row + 1];

        while prev < prev_end && curr < curr_end {
            let run_a = runs[prev];
            let run_b = runs[curr];
            if runs_touch(&run_a, &run_b) {
                dsu.union(run_a.label, run_b.label);
            }
            if run_a.end <= run_b.end {
                prev += 1;
            } else {
                curr += 1;
            }
        }
    }

    let mut order = Vec::new();
    let mut stats: Vec<Option<ComponentStats>> = vec![None; dsu.len()];
    for run in runs.iter() {
        let root = dsu.find(run.label) as usize;
        let entry = stats[root].get_or_insert_with(|| {
            order.push(root);
            ComponentStats::new(run.start, run.row)
        });
        let offset = run.row * width;
        entry.pixels += run.end - run.start;
        entry.luma_sum += luma[offset + run.start..offset + run.end]
            .iter()
            .map(|&v| u64::from(v))
            .sum::<u64>();
        entry.min_x = entry.min_x.min(run.start);
        entry.max_x = entry.max_x.max(run.end - 1);
        entry.min_y = entry.min_y.min(run.row);
        entry.max_y = entry.max_y.max(run.row);
    }

    order
        .into_iter()
        .filter_map(|root| stats[root])
        .map(|comp| Component {
            x: comp.min_x,
            y: comp.min_y,
            width: comp.max_x - comp.min_x + 1,
            height: comp.max_y - comp.min_y + 1,
            pixels: comp.pixels,
            luma_sum: comp.luma_sum,
        })
        .collect()
}

// Runs on adjacent rows touch when they overlap or meet diagonally.
fn runs_touch(a: &RowRun, b: &RowRun) -> bool {
    a.start <= b.end && b.start <= a.end
}

struct DisjointSet {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new() -> Self {
        Self {
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn make_set(&mut self) -> u32 {
        let idx = self.parent.len() as u32;
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut node = x;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let rank_a = self.rank[root_a as usize];
        let rank_b = self.rank[root_b as usize];
        if rank_a < rank_b {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b as usize] = root_a;
        if rank_a == rank_b {
            self.rank[root_a as usize] = rank_a + 1;
        }
    }
}
