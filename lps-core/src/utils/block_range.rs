/// Splits the inclusive range `[from, to]` into consecutive inclusive pages
/// of at most `page_size` blocks.
///
/// Returns nothing when `from > to`. A zero page size is treated as one.
pub fn block_pages(from: u64, to: u64, page_size: u64) -> Vec<(u64, u64)> {
    let page_size = page_size.max(1);
    let mut pages = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(page_size - 1).min(to);
        pages.push((start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    pages
}

/// Next range to scan after `last_scanned`, capped to `page_size` blocks.
///
/// `None` when the tip has not moved past what was already scanned.
pub fn next_range(last_scanned: u64, tip: u64, page_size: u64) -> Option<(u64, u64)> {
    if tip <= last_scanned {
        return None;
    }
    let from = last_scanned + 1;
    let to = from.saturating_add(page_size.max(1) - 1).min(tip);
    Some((from, to))
}
