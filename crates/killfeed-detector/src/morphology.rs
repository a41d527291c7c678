//! Binary morphology on 0/255 masks with a square structuring element.
//!
//! Each pass is separable and uses the van Herk/Gil-Werman running
//! min/max, so cost does not grow with the kernel size. Pixels outside the
//! mask never influence the result.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Dilate,
    Erode,
}

impl Operation {
    fn combine(self) -> fn(u8, u8) -> u8 {
        match self {
            Operation::Dilate => u8::max,
            Operation::Erode => u8::min,
        }
    }

    fn neutral(self) -> u8 {
        match self {
            Operation::Dilate => 0,
            Operation::Erode => u8::MAX,
        }
    }
}

/// Closing followed by opening: bridges hairline gaps, then drops speckle.
pub(crate) fn close_then_open(mask: &mut [u8], width: usize, height: usize, kernel: usize) {
    if kernel <= 1 || width == 0 || height == 0 {
        return;
    }
    let mut workspace = Workspace::new(width.max(height), kernel);
    for op in [
        Operation::Dilate,
        Operation::Erode,
        Operation::Erode,
        Operation::Dilate,
    ] {
        apply(mask, width, height, kernel, op, &mut workspace);
    }
}

struct Workspace {
    padded: Vec<u8>,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    column: Vec<u8>,
    out: Vec<u8>,
}

impl Workspace {
    fn new(max_line: usize, kernel: usize) -> Self {
        let padded_len = max_line + kernel - 1;
        Self {
            padded: Vec::with_capacity(padded_len),
            prefix: vec![0; padded_len],
            suffix: vec![0; padded_len],
            column: vec![0; max_line],
            out: vec![0; max_line],
        }
    }
}

fn apply(
    mask: &mut [u8],
    width: usize,
    height: usize,
    kernel: usize,
    op: Operation,
    ws: &mut Workspace,
) {
    for row in mask.chunks_mut(width).take(height) {
        let out = &mut ws.out[..width];
        line_op(row, out, kernel, op, &mut ws.padded, &mut ws.prefix, &mut ws.suffix);
        row.copy_from_slice(out);
    }

    for col in 0..width {
        let column = &mut ws.column[..height];
        for (y, value) in column.iter_mut().enumerate() {
            *value = mask[y * width + col];
        }
        let out = &mut ws.out[..height];
        line_op(column, out, kernel, op, &mut ws.padded, &mut ws.prefix, &mut ws.suffix);
        for (y, value) in out.iter().enumerate() {
            mask[y * width + col] = *value;
        }
    }
}

fn line_op(
    src: &[u8],
    dst: &mut [u8],
    kernel: usize,
    op: Operation,
    padded: &mut Vec<u8>,
    prefix: &mut [u8],
    suffix: &mut [u8],
) {
    let combine = op.combine();
    let anchor = kernel / 2;

    padded.clear();
    padded.resize(anchor, op.neutral());
    padded.extend_from_slice(src);
    padded.resize(src.len() + kernel - 1, op.neutral());

    let len = padded.len();
    for i in 0..len {
        prefix[i] = if i % kernel == 0 {
            padded[i]
        } else {
            combine(prefix[i - 1], padded[i])
        };
    }
    let last = len - 1;
    for i in (0..len).rev() {
        suffix[i] = if i == last || (i + 1) % kernel == 0 {
            padded[i]
        } else {
            combine(suffix[i + 1], padded[i])
        };
    }

    for (x, value) in dst.iter_mut().enumerate() {
        *value = combine(suffix[x], prefix[x + kernel - 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> (Vec<u8>, usize, usize) {
        let width = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|row| row.bytes().map(|b| if b == b'#' { 255 } else { 0 }))
            .collect();
        (data, width, rows.len())
    }

    fn apply_single(mask: &mut [u8], width: usize, height: usize, op: Operation) {
        let mut ws = Workspace::new(width.max(height), 3);
        apply(mask, width, height, 3, op, &mut ws);
    }

    #[test]
    fn dilation_grows_by_kernel_radius() {
        let (mut mask, width, height) = mask_from(&[".....", ".....", "..#..", ".....", "....."]);
        apply_single(&mut mask, width, height, Operation::Dilate);
        let (expected, _, _) = mask_from(&[".....", ".###.", ".###.", ".###.", "....."]);
        assert_eq!(mask, expected);
    }

    #[test]
    fn erosion_ignores_pixels_outside_the_mask() {
        let (mut mask, width, height) = mask_from(&["###", "###", "###"]);
        apply_single(&mut mask, width, height, Operation::Erode);
        assert!(mask.iter().all(|&v| v == 255));
    }

    #[test]
    fn solid_rectangle_survives_close_and_open() {
        let (mut mask, width, height) = mask_from(&[
            "..........",
            "..........",
            "..#####...",
            "..#####...",
            "..#####...",
            "..........",
            "..........",
        ]);
        let original = mask.clone();
        close_then_open(&mut mask, width, height, 3);
        assert_eq!(mask, original);
    }

    #[test]
    fn speckle_is_removed_and_hairline_gap_is_bridged() {
        let (mut mask, width, height) = mask_from(&[
            "...............",
            "...............",
            "..###.###......",
            "..###.###...#..",
            "..###.###......",
            "...............",
            "...............",
        ]);
        close_then_open(&mut mask, width, height, 3);
        let (expected, _, _) = mask_from(&[
            "...............",
            "...............",
            "..#######......",
            "..#######......",
            "..#######......",
            "...............",
            "...............",
        ]);
        assert_eq!(mask, expected);
    }

    #[test]
    fn kernel_of_one_is_identity() {
        let (mut mask, width, height) = mask_from(&["#.#", ".#.", "#.#"]);
        let original = mask.clone();
        close_then_open(&mut mask, width, height, 1);
        assert_eq!(mask, original);
    }
}
