use crate::core::types::DocId;
use crate::search::index_result::IndexResult;
use crate::search::iterator::{IndexIterator, SkipOutcome};

/// AND over child iterators. The child with the smallest estimate leads;
/// whenever any other child lands past the current candidate, that id
/// becomes the new candidate and the round restarts. When `slop >= 0` or
/// `in_order` is set, agreeing docs must also pass a position-window check.
pub struct IntersectIterator {
    /// Children stay in query order; it is what the in-order check is
    /// defined over.
    children: Vec<Box<dyn IndexIterator>>,
    leader: usize,
    slop: i32,
    in_order: bool,
    pub weight: f64,
    last_id: DocId,
    at_eof: bool,
    num_estimated: usize,
}

impl IntersectIterator {
    pub fn new(
        children: Vec<Box<dyn IndexIterator>>,
        slop: i32,
        in_order: bool,
        weight: f64,
    ) -> Self {
        let leader = (0..children.len())
            .min_by_key(|&i| children[i].num_estimated())
            .unwrap_or(0);
        let num_estimated = children
            .iter()
            .map(|c| c.num_estimated())
            .min()
            .unwrap_or(0);
        IntersectIterator {
            children,
            leader,
            slop,
            in_order,
            weight,
            last_id: DocId(0),
            at_eof: false,
            num_estimated,
        }
    }

    /// Drive all children to agree on one docId. Returns the agreed hits in
    /// query order.
    fn next_agreement(&mut self) -> Option<(DocId, Vec<IndexResult>)> {
        let lead = self.children[self.leader].read()?;
        let target = lead.doc_id;
        self.settle(target, lead)
    }

    /// Settle agreement starting from a candidate the leader already sits on.
    fn settle(
        &mut self,
        mut target: DocId,
        lead: IndexResult,
    ) -> Option<(DocId, Vec<IndexResult>)> {
        let n = self.children.len();
        let mut results: Vec<Option<IndexResult>> = (0..n).map(|_| None).collect();
        results[self.leader] = Some(lead);

        'round: loop {
            for i in 0..n {
                let aligned = results[i]
                    .as_ref()
                    .is_some_and(|r| r.doc_id == target);
                if aligned {
                    continue;
                }
                match self.children[i].skip_to(target) {
                    SkipOutcome::Found(r) => results[i] = Some(r),
                    SkipOutcome::NotFound(r) => {
                        target = r.doc_id;
                        results[i] = Some(r);
                        continue 'round;
                    }
                    SkipOutcome::Eof => return None,
                }
            }
            let hits = results.into_iter().map(|r| r.unwrap()).collect();
            return Some((target, hits));
        }
    }
}

impl IndexIterator for IntersectIterator {
    fn read(&mut self) -> Option<IndexResult> {
        if self.at_eof || self.children.is_empty() {
            return None;
        }
        loop {
            let Some((doc_id, hits)) = self.next_agreement() else {
                self.at_eof = true;
                return None;
            };
            if (self.slop >= 0 || self.in_order) && !within_range(&hits, self.slop, self.in_order)
            {
                continue;
            }
            self.last_id = doc_id;
            return Some(IndexResult::aggregate(doc_id, hits));
        }
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        if self.at_eof || self.children.is_empty() {
            return SkipOutcome::Eof;
        }
        // Push the leader to the target, settle agreement from wherever it
        // lands, then fall back to plain reads if the position check drops
        // the candidate.
        let lead = match self.children[self.leader].skip_to(doc_id) {
            SkipOutcome::Eof => {
                self.at_eof = true;
                return SkipOutcome::Eof;
            }
            SkipOutcome::Found(r) | SkipOutcome::NotFound(r) => r,
        };
        let target = lead.doc_id;
        let mut agreed = self.settle(target, lead);
        loop {
            match agreed {
                None => {
                    self.at_eof = true;
                    return SkipOutcome::Eof;
                }
                Some((id, hits)) => {
                    if (self.slop >= 0 || self.in_order)
                        && !within_range(&hits, self.slop, self.in_order)
                    {
                        agreed = self.next_agreement();
                        continue;
                    }
                    self.last_id = id;
                    let agg = IndexResult::aggregate(id, hits);
                    return if id == doc_id {
                        SkipOutcome::Found(agg)
                    } else {
                        SkipOutcome::NotFound(agg)
                    };
                }
            }
        }
    }

    fn rewind(&mut self) {
        for c in &mut self.children {
            c.rewind();
        }
        self.last_id = DocId(0);
        self.at_eof = false;
    }

    fn has_next(&self) -> bool {
        !self.at_eof
    }

    fn num_estimated(&self) -> usize {
        self.num_estimated
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }
}

/// Position window check over the agreed hits. Children without position
/// data (numeric filters, id lists) do not constrain the window.
fn within_range(hits: &[IndexResult], slop: i32, in_order: bool) -> bool {
    let lists: Vec<Vec<u32>> = hits
        .iter()
        .map(|h| h.positions())
        .filter(|p| !p.is_empty())
        .collect();
    if lists.len() < 2 {
        return true;
    }
    let slop = if slop < 0 { i32::MAX } else { slop };
    if in_order {
        in_order_span(&lists, slop)
    } else {
        min_window_span(&lists, slop)
    }
}

/// Smallest span of one position per list where picks ascend in list order.
fn in_order_span(lists: &[Vec<u32>], slop: i32) -> bool {
    for &start in &lists[0] {
        let mut prev = start;
        let mut ok = true;
        for list in &lists[1..] {
            match list.iter().find(|&&p| p > prev) {
                Some(&p) => prev = p,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            let span = (prev - start) as i64 - (lists.len() as i64 - 1);
            if span <= slop as i64 {
                return true;
            }
        }
    }
    false
}

/// Smallest window containing one position from every list, any order.
fn min_window_span(lists: &[Vec<u32>], slop: i32) -> bool {
    let mut items: Vec<(u32, usize)> = Vec::new();
    for (i, list) in lists.iter().enumerate() {
        for &p in list {
            items.push((p, i));
        }
    }
    items.sort_unstable();

    let n = lists.len();
    let mut counts = vec![0usize; n];
    let mut covered = 0usize;
    let mut lo = 0usize;
    for hi in 0..items.len() {
        let (_, i) = items[hi];
        counts[i] += 1;
        if counts[i] == 1 {
            covered += 1;
        }
        while covered == n {
            let span = (items[hi].0 - items[lo].0) as i64 - (n as i64 - 1);
            if span <= slop as i64 {
                return true;
            }
            let (_, j) = items[lo];
            counts[j] -= 1;
            if counts[j] == 0 {
                covered -= 1;
            }
            lo += 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::iterator::IdListIterator;

    fn ids(v: &[u64]) -> Box<dyn IndexIterator> {
        Box::new(IdListIterator::new(v.iter().map(|&i| DocId(i)).collect()))
    }

    #[test]
    fn test_intersection() {
        let mut it =
            IntersectIterator::new(vec![ids(&[1, 3, 5, 9]), ids(&[2, 3, 9, 12])], -1, false, 1.0);
        let got: Vec<u64> = std::iter::from_fn(|| it.read()).map(|r| r.doc_id.0).collect();
        assert_eq!(got, vec![3, 9]);
    }

    #[test]
    fn test_empty_intersection() {
        let mut it = IntersectIterator::new(vec![ids(&[1, 2]), ids(&[3, 4])], -1, false, 1.0);
        assert!(it.read().is_none());
        assert!(!it.has_next());
    }

    #[test]
    fn test_exact_phrase_window() {
        // "hello world": consecutive ascending positions
        assert!(in_order_span(&[vec![0], vec![1]], 0));
        // reversed order fails in-order
        assert!(!in_order_span(&[vec![1], vec![0]], 0));
        // one word apart needs slop >= 1
        assert!(!in_order_span(&[vec![0], vec![2]], 0));
        assert!(in_order_span(&[vec![0], vec![2]], 1));
    }

    #[test]
    fn test_unordered_window() {
        // "world hello" within slop 0, any order
        assert!(min_window_span(&[vec![5], vec![4]], 0));
        assert!(!min_window_span(&[vec![9], vec![4]], 2));
        assert!(min_window_span(&[vec![9], vec![4]], 4));
    }
}
