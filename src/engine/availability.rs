use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Free windows of a continuous resource inside `query`: the query minus
/// every live claim, clamped to the query bounds.
pub fn free_windows(timeline: &Timeline, query: &Span) -> Vec<Span> {
    let taken: Vec<Span> = timeline
        .overlapping(query)
        .iter()
        .map(|c| Span::new(c.span.start.max(query.start), c.span.end.min(query.end)))
        .collect();
    subtract_intervals(&[*query], &taken)
}

/// Subtract sorted, disjoint `to_remove` spans from sorted `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
