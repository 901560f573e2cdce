/// Split `items` into contiguous, order-preserving batches of at most
/// `size` items. `size` must be non-zero.
pub fn batches<T>(items: &[T], size: usize) -> Vec<&[T]> {
    debug_assert!(size > 0, "batch size must be non-zero");
    items.chunks(size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_sizes_for_120_by_50() {
        let items: Vec<u32> = (0..120).collect();
        let sizes: Vec<usize> = batches(&items, 50).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[test]
    fn test_concatenation_equals_input() {
        for n in [0usize, 1, 49, 50, 51, 100, 173] {
            for size in [1usize, 7, 50] {
                let items: Vec<usize> = (0..n).collect();
                let planned = batches(&items, size);
                assert_eq!(planned.len(), n.div_ceil(size));
                assert!(planned.iter().all(|b| !b.is_empty() && b.len() <= size));
                assert_eq!(planned.concat(), items);
            }
        }
    }
}
