use parking_lot::Mutex;
use std::sync::Arc;
use crate::core::error::Result;
use crate::core::spec::IndexSpec;
use crate::pipeline::fragmenter::{
    fragmentize, highlight_ranges, normalize_whitespace, summarize, trim_field, HighlightTags,
    ESTIMATED_WORD_SIZE,
};
use crate::pipeline::processor::{field_to_value, ResultProcessor, RpResult, SearchResult};
use crate::schema::FieldType;
use crate::value::lookup::{key_flags, Lookup};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct SummarizeSettings {
    /// Context words on each side of a match.
    pub context_len: usize,
    pub num_frags: usize,
    pub separator: String,
}

impl Default for SummarizeSettings {
    fn default() -> Self {
        SummarizeSettings {
            context_len: 5,
            num_frags: 3,
            separator: "... ".to_string(),
        }
    }
}

/// Per-field highlight/summarize request.
#[derive(Debug, Clone)]
pub struct HighlightField {
    pub name: String,
    pub highlight: bool,
    pub summarize: bool,
    pub tags: HighlightTags,
    pub summarize_settings: SummarizeSettings,
}

impl HighlightField {
    pub fn highlight(name: &str) -> Self {
        HighlightField {
            name: name.to_string(),
            highlight: true,
            summarize: false,
            tags: HighlightTags::default(),
            summarize_settings: SummarizeSettings::default(),
        }
    }

    pub fn summarize(name: &str) -> Self {
        HighlightField {
            name: name.to_string(),
            highlight: false,
            summarize: true,
            tags: HighlightTags::default(),
            summarize_settings: SummarizeSettings::default(),
        }
    }

    pub fn with_highlight(mut self) -> Self {
        self.highlight = true;
        self
    }
}

/// Rewrites requested fields with highlighted or summarized text. Byte
/// offsets recorded at ingest are intersected with the term positions of
/// the index result; without them the field falls back to a plain trim.
pub struct HighlighterProcessor {
    upstream: Box<dyn ResultProcessor>,
    spec: Arc<IndexSpec>,
    lookup: Arc<Mutex<Lookup>>,
    fields: Vec<HighlightField>,
}

impl HighlighterProcessor {
    pub fn new(
        upstream: Box<dyn ResultProcessor>,
        spec: Arc<IndexSpec>,
        lookup: Arc<Mutex<Lookup>>,
        fields: Vec<HighlightField>,
    ) -> Self {
        HighlighterProcessor {
            upstream,
            spec,
            lookup,
            fields,
        }
    }

    /// Matched byte ranges of one field, from the index result's term
    /// positions routed through the document's byte-offset map.
    fn matched_ranges(&self, res: &SearchResult, field_bit: u32) -> Vec<(usize, usize)> {
        let Some(ir) = res.index_result.as_ref() else {
            return Vec::new();
        };
        let Some(bo) = res.dmd.as_ref().and_then(|d| d.byte_offsets()) else {
            return Vec::new();
        };
        let mut ranges = Vec::new();
        ir.for_each_term(&mut |_term, offsets, _freq| {
            for &pos in offsets {
                if let Some((s, e)) = bo.token_range(field_bit, pos) {
                    ranges.push((s as usize, e as usize));
                }
            }
        });
        ranges
    }

    fn process_field(&self, res: &mut SearchResult, cfg: &HighlightField) {
        let Some(fs) = self.spec.schema.field(&cfg.name) else {
            return;
        };
        if fs.field_type != FieldType::FullText {
            return;
        }
        let key = self.lookup.lock().get_or_create(&cfg.name, key_flags::DOC_SRC);
        let text = match res.row.get(&key) {
            Some(Value::String(s)) => s.clone(),
            _ => {
                // Field was not loaded; fetch it for the rewrite.
                let Some(dmd) = res.dmd.as_ref() else { return };
                let Some(fields) = self.spec.doc_store.load(&dmd.key) else {
                    return;
                };
                let Some(v) = fields.get(&cfg.name) else { return };
                match field_to_value(v) {
                    Value::String(s) => s,
                    _ => return,
                }
            }
        };

        let ranges = self.matched_ranges(res, fs.text_bit.unwrap_or(0));
        let out = if ranges.is_empty() {
            if cfg.summarize {
                trim_field(
                    &text,
                    cfg.summarize_settings.context_len,
                    cfg.summarize_settings.num_frags,
                )
            } else {
                // Highlight-only with nothing to mark: leave the field as is.
                normalize_whitespace(&text)
            }
        } else if cfg.summarize {
            let context_bytes = cfg.summarize_settings.context_len * ESTIMATED_WORD_SIZE;
            let frags = fragmentize(&text, ranges, context_bytes);
            summarize(
                &text,
                &frags,
                cfg.summarize_settings.num_frags,
                &cfg.summarize_settings.separator,
                cfg.highlight.then_some(&cfg.tags),
            )
        } else {
            highlight_ranges(&text, &ranges, &cfg.tags)
        };
        res.row.set(&key, Value::String(out));
    }
}

impl ResultProcessor for HighlighterProcessor {
    fn name(&self) -> &'static str {
        "Highlighter"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        match self.upstream.next(res)? {
            RpResult::Eof => return Ok(RpResult::Eof),
            RpResult::Ok => {}
        }
        for cfg in &self.fields {
            self.process_field(res, cfg);
        }
        Ok(RpResult::Ok)
    }
}
