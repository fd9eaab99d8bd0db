//! Connected-region extraction from binary masks.

/// A connected region of set pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    /// Number of pixels in the region.
    pub area: usize,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Blob {
    fn seed(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Labels 8-connected regions of `true` pixels in a row-major mask.
///
/// Uses an explicit stack, so large regions cannot overflow the call stack.
/// A mask whose length is not `width × height` has no blobs.
pub fn find_blobs(mask: &[bool], width: u32, height: u32) -> Vec<Blob> {
    let (w, h) = (width as usize, height as usize);
    if mask.len() != w * h {
        tracing::debug!(len = mask.len(), width, height, "mask does not match frame size");
        return Vec::new();
    }

    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut blobs = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut blob = Blob::seed((start % w) as u32, (start / w) as u32);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            blob.include(x as u32, y as u32);

            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
        blobs.push(blob);
    }
    blobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> (Vec<bool>, u32, u32) {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mask = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();
        (mask, width, height)
    }

    #[test]
    fn test_empty_mask_has_no_blobs() {
        let (mask, w, h) = mask_from(&["....", "...."]);
        assert!(find_blobs(&mask, w, h).is_empty());
    }

    #[test]
    fn test_separate_regions() {
        let (mask, w, h) = mask_from(&[
            "##....",
            "##....",
            ".....#",
        ]);
        let blobs = find_blobs(&mask, w, h);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].area, 4);
        assert_eq!((blobs[0].min_x, blobs[0].max_x), (0, 1));
        assert_eq!(blobs[1].area, 1);
        assert_eq!((blobs[1].min_x, blobs[1].min_y), (5, 2));
    }

    #[test]
    fn test_diagonal_neighbours_connect() {
        let (mask, w, h) = mask_from(&[
            "#..",
            ".#.",
            "..#",
        ]);
        let blobs = find_blobs(&mask, w, h);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 3);
    }

    #[test]
    fn test_short_mask_is_rejected() {
        let mask = vec![true; 20];
        assert!(find_blobs(&mask, 8, 8).is_empty());
    }

    #[test]
    fn test_full_frame_is_one_blob() {
        let mask = vec![true; 64 * 48];
        let blobs = find_blobs(&mask, 64, 48);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 64 * 48);
    }
}
