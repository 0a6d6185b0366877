pub mod context;

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use crate::compression::varint;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind};
use crate::core::spec::{IndexInner, IndexSpec};
use crate::core::types::DocId;
use crate::index::inverted::IndexWriteEntry;
use crate::indexer::context::{add_options, ctx_flags, AddDocumentCtx, FieldIndexerData};

/// How many merged terms are written between drop checks inside the
/// critical section.
const TICK_INTERVAL: usize = 64;

/// One posting list of the merged term table: the term plus, per
/// occurrence-owning document, its parent-map slot and the index of its
/// forward entry there.
struct MergedList {
    term: Vec<u8>,
    entries: Vec<(u32, u32)>,
}

type MergedTable = HashMap<u64, Vec<MergedList>>;

/// Per-index background worker. Owns a FIFO queue behind a mutex/condvar
/// pair; all index mutations funnel through it, serialized under the index
/// write lock. Degrades to inline processing when concurrent mode is off or
/// a context is marked non-blocking.
pub struct DocumentIndexer {
    spec: Weak<IndexSpec>,
    config: Arc<Config>,
    queue: Mutex<VecDeque<Box<AddDocumentCtx>>>,
    cond: Condvar,
    stopped: AtomicBool,
    threadless: bool,
}

impl DocumentIndexer {
    pub fn new(spec: &Arc<IndexSpec>) -> Arc<DocumentIndexer> {
        let threadless = !spec.config.concurrent_mode;
        let indexer = Arc::new(DocumentIndexer {
            spec: Arc::downgrade(spec),
            config: spec.config.clone(),
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            stopped: AtomicBool::new(false),
            threadless,
        });
        if !threadless {
            let worker = indexer.clone();
            let name = format!("textdex-indexer-{}", spec.name);
            thread::Builder::new()
                .name(name)
                .spawn(move || worker.main_loop())
                .ok();
        }
        indexer
    }

    /// Hand a context to the worker. Ownership transfers; completion is
    /// signaled through the context's channel.
    pub fn add(&self, ctx: Box<AddDocumentCtx>) {
        if self.stopped.load(Ordering::Acquire) {
            let mut ctx = ctx;
            ctx.mark_error(Error::new(ErrorKind::NoSuchIndex, "index was dropped"));
            ctx.finish();
            return;
        }
        if self.threadless || !ctx.is_blockable() {
            self.process_chain(vec![ctx]);
            return;
        }
        let mut queue = self.queue.lock();
        queue.push_back(ctx);
        self.cond.notify_one();
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    fn main_loop(&self) {
        loop {
            let chain = {
                let mut queue = self.queue.lock();
                while queue.is_empty() && !self.stopped.load(Ordering::Acquire) {
                    self.cond.wait(&mut queue);
                }
                if queue.is_empty() {
                    break;
                }
                let take = queue.len().min(self.config.max_bulk_docs);
                queue.drain(..take).collect::<Vec<_>>()
            };
            self.process_chain(chain);
            if self.stopped.load(Ordering::Acquire) && self.queue.lock().is_empty() {
                break;
            }
        }
    }

    fn process_chain(&self, mut chain: Vec<Box<AddDocumentCtx>>) {
        while !chain.is_empty() {
            self.process_bulk(&mut chain);
        }
        self.maybe_reclaim();
    }

    /// Reclamation pass over deleted metadata entries, run between bulks
    /// once enough deletions have accumulated. Entries still referenced by
    /// in-flight results survive until a later pass.
    fn maybe_reclaim(&self) {
        let Some(spec) = self.spec.upgrade() else {
            return;
        };
        if spec.is_dropped() {
            return;
        }
        let pending = spec.inner.read().docs.num_deleted();
        if pending >= self.config.gc_threshold {
            spec.inner.write().docs.reclaim();
        }
    }

    /// One pass of the pipeline: merge forward indexes, assign ids in bulk,
    /// write postings and auxiliary indexes under the critical section, then
    /// fire completions.
    fn process_bulk(&self, chain: &mut Vec<Box<AddDocumentCtx>>) {
        let use_merge = chain.len() > 1 && chain[0].state_flags & ctx_flags::TEXT_INDEXED == 0;

        let (table, bulk_len) = if use_merge {
            self.do_merge(chain)
        } else {
            chain[0].state_flags |= ctx_flags::TEXT_INDEXED;
            (MergedTable::new(), 1)
        };
        // A degenerate iteration cap must still consume the head.
        let bulk_len = bulk_len.max(1);
        let mut bulk: Vec<Box<AddDocumentCtx>> = chain.drain(..bulk_len).collect();

        let first_zero = bulk
            .iter()
            .position(|c| !c.doc_id.is_assigned())
            .filter(|&i| !bulk[i].is_errored());

        let spec = match self.spec.upgrade() {
            Some(spec) if !spec.is_dropped() => spec,
            _ => {
                for mut ctx in bulk {
                    ctx.mark_error(Error::new(ErrorKind::NoSuchIndex, "index was dropped"));
                    ctx.finish();
                }
                return;
            }
        };

        {
            let mut inner = spec.inner.write();

            if let Some(start) = first_zero {
                self.assign_ids(&mut bulk[start..], &mut inner, &spec);
            }

            if use_merge {
                self.write_merged(&table, &mut bulk, &mut inner, &spec);
            } else if !bulk[0].is_errored() && bulk[0].doc_id.is_assigned() {
                self.write_single(&mut bulk[0], &mut inner, &spec);
            }

            self.index_other_fields(&mut bulk, &mut inner);
        }

        for ctx in bulk {
            if !ctx.is_errored() && ctx.options & add_options::NOSAVE == 0 {
                spec.doc_store.save(&ctx.doc.key, &ctx.doc.fields);
            }
            ctx.finish();
        }
    }

    /// Merge the forward indexes of consecutive contexts into one term
    /// table, tagging each entry with its parent-map slot. Stops at the bulk
    /// cap or the iteration throttle, whichever trips first.
    fn do_merge(&self, chain: &mut [Box<AddDocumentCtx>]) -> (MergedTable, usize) {
        let mut table = MergedTable::new();
        let mut counter = 0usize;
        let mut slot = 0usize;

        while slot < chain.len() && slot < self.config.max_bulk_docs {
            counter += 1;
            if counter >= self.config.merge_iteration_cap {
                break;
            }
            let ctx = &mut chain[slot];
            for (entry_idx, entry) in ctx.fwd.entries.iter_mut().enumerate() {
                entry.doc_ref = slot as u32;
                let bucket = table.entry(entry.hash).or_default();
                match bucket.iter_mut().find(|ml| ml.term == entry.term) {
                    Some(ml) => ml.entries.push((slot as u32, entry_idx as u32)),
                    None => bucket.push(MergedList {
                        term: entry.term.clone(),
                        entries: vec![(slot as u32, entry_idx as u32)],
                    }),
                }
            }
            // Not strictly indexed yet, but no further text interaction
            // happens for this context.
            ctx.state_flags |= ctx_flags::TEXT_INDEXED;
            slot += 1;
        }
        (table, slot)
    }

    /// Bulk document-id assignment. A failing context is marked errored and
    /// its siblings continue.
    fn assign_ids(
        &self,
        bulk: &mut [Box<AddDocumentCtx>],
        inner: &mut IndexInner,
        spec: &IndexSpec,
    ) {
        for ctx in bulk.iter_mut() {
            if ctx.is_errored() {
                continue;
            }
            debug_assert!(!ctx.doc_id.is_assigned());

            if ctx.options & add_options::REPLACE != 0 {
                match inner.docs.pop_by_key(&ctx.doc.key) {
                    Some(old) => {
                        inner.stats.num_documents -= 1;
                        if old.flags() & crate::index::doc_table::doc_flags::HAS_ON_DEMAND_DELETABLE
                            != 0
                        {
                            for geo in inner.geo.values_mut() {
                                geo.remove_entries(old.id);
                            }
                        }
                    }
                    None => {
                        if ctx.options & add_options::NOCREATE != 0 {
                            ctx.mark_error(Error::new(
                                ErrorKind::DocNotFound,
                                format!("document `{}` does not exist", ctx.doc.key),
                            ));
                            continue;
                        }
                    }
                }
            }

            match inner.docs.put(
                &ctx.doc.key,
                ctx.doc.score,
                ctx.doc_flags,
                ctx.doc.payload.clone(),
            ) {
                Ok(id) => {
                    ctx.doc_id = id;
                    inner.stats.num_documents += 1;
                    inner.stats.total_doc_len += ctx.fwd.total_freq as u64;
                    if let Some(md) = inner.docs.get_by_id(id) {
                        md.set_max_freq(ctx.fwd.max_freq);
                        md.set_len(ctx.fwd.total_freq);
                    }
                    if let Some(sv) = ctx.sort_vector.take() {
                        inner.docs.set_sorting_vector(id, sv);
                    }
                    if let Some(bo) = ctx.byte_offsets.take() {
                        inner.docs.set_byte_offsets(id, bo);
                    }
                }
                Err(err) => ctx.mark_error(err),
            }
        }
    }

    /// Walk the merged table and append one posting per live forward entry.
    fn write_merged(
        &self,
        table: &MergedTable,
        bulk: &mut [Box<AddDocumentCtx>],
        inner: &mut IndexInner,
        spec: &IndexSpec,
    ) {
        let encoder = spec.encoder();
        // Parent-slot -> docId cache saves a context dereference per record.
        let mut doc_id_map = vec![0u64; bulk.len()];
        let mut tick = 0usize;

        for bucket in table.values() {
            for ml in bucket {
                if inner.terms.insert(&ml.term) {
                    inner.stats.num_terms += 1;
                }
                let (max_entries, max_bytes) =
                    (self.config.block_max_entries, self.config.block_max_bytes);

                let mut written_bytes = 0usize;
                let mut written_records = 0usize;
                let mut offsets_bytes = 0usize;
                let mut offsets_records = 0usize;
                {
                    let idx = inner.text_index_mut(&ml.term, encoder);
                    for &(doc_ref, entry_idx) in &ml.entries {
                        let ctx = &bulk[doc_ref as usize];
                        if ctx.is_errored() || !ctx.doc_id.is_assigned() {
                            continue;
                        }
                        let mut doc_id = doc_id_map[doc_ref as usize];
                        if doc_id == 0 {
                            doc_id = ctx.doc_id.0;
                            doc_id_map[doc_ref as usize] = doc_id;
                        }
                        let entry = &ctx.fwd.entries[entry_idx as usize];
                        written_bytes += idx.write_entry(
                            &IndexWriteEntry {
                                doc_id: DocId(doc_id),
                                freq: entry.freq,
                                field_mask: entry.field_mask,
                                offsets: &entry.positions,
                                value: 0.0,
                            },
                            max_entries,
                            max_bytes,
                        );
                        written_records += 1;
                        offsets_bytes += varint::deltas_len(&entry.positions);
                        offsets_records += entry.positions.len();
                    }
                }
                inner.stats.inverted_size_bytes += written_bytes;
                inner.stats.num_records += written_records;
                inner.stats.offset_vecs_size += offsets_bytes;
                inner.stats.offset_vec_records += offsets_records;

                tick += 1;
                if tick % TICK_INTERVAL == 0 && spec.is_dropped() {
                    if let Some(head) = bulk.first_mut() {
                        head.mark_error(Error::new(ErrorKind::NoSuchIndex, "index was dropped"));
                    }
                    return;
                }
            }
        }
    }

    /// Single-context fast path; nothing to merge.
    fn write_single(
        &self,
        ctx: &mut Box<AddDocumentCtx>,
        inner: &mut IndexInner,
        spec: &IndexSpec,
    ) {
        let encoder = spec.encoder();
        let doc_id = ctx.doc_id;
        let mut tick = 0usize;
        for entry in &ctx.fwd.entries {
            if inner.terms.insert(&entry.term) {
                inner.stats.num_terms += 1;
            }
            let written = {
                let idx = inner.text_index_mut(&entry.term, encoder);
                idx.write_entry(
                    &IndexWriteEntry {
                        doc_id,
                        freq: entry.freq,
                        field_mask: entry.field_mask,
                        offsets: &entry.positions,
                        value: 0.0,
                    },
                    self.config.block_max_entries,
                    self.config.block_max_bytes,
                )
            };
            inner.stats.inverted_size_bytes += written;
            inner.stats.num_records += 1;
            inner.stats.offset_vecs_size += varint::deltas_len(&entry.positions);
            inner.stats.offset_vec_records += entry.positions.len();

            tick += 1;
            if tick % TICK_INTERVAL == 0 && spec.is_dropped() {
                ctx.mark_error(Error::new(ErrorKind::NoSuchIndex, "index was dropped"));
                return;
            }
        }
    }

    /// Per-type bulk indexers for the non-full-text fields.
    fn index_other_fields(&self, bulk: &mut [Box<AddDocumentCtx>], inner: &mut IndexInner) {
        for ctx in bulk.iter_mut() {
            if ctx.is_errored() || !ctx.doc_id.is_assigned() {
                continue;
            }
            for fd in &ctx.field_data {
                match fd {
                    FieldIndexerData::Numeric { field, value } => {
                        let tree = inner.numeric.entry(field.clone()).or_default();
                        tree.add(ctx.doc_id, *value);
                    }
                    FieldIndexerData::Tags { field, values } => {
                        let tags = inner.tags.entry(field.clone()).or_default();
                        tags.index_document(ctx.doc_id, values);
                    }
                    FieldIndexerData::Geo { field, lon, lat } => {
                        let geo = inner.geo.entry(field.clone()).or_default();
                        geo.add_entry(ctx.doc_id, *lon, *lat);
                    }
                }
            }
            ctx.state_flags |= ctx_flags::OTHER_INDEXED;
        }
    }
}
