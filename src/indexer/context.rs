use crossbeam::channel::{bounded, Receiver, Sender};
use crate::analysis::Analyzer;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::spec::IndexSpec;
use crate::core::types::{DocId, Document, FieldValue};
use crate::index::doc_table::{doc_flags, SortingVector};
use crate::index::forward::ForwardIndex;
use crate::index::offsets::{ByteOffsets, ByteOffsetsWriter};
use crate::index::tag::split_tags;
use crate::schema::FieldType;
use crate::value::Value;

pub mod add_options {
    /// Overwrite an existing document with the same key.
    pub const REPLACE: u32 = 1 << 0;
    /// Merge unlisted fields from the existing document. Implies REPLACE.
    pub const PARTIAL: u32 = 1 << 1;
    /// Index only; do not store the raw fields.
    pub const NOSAVE: u32 = 1 << 2;
    /// Only replace an existing document, never create one.
    pub const NOCREATE: u32 = 1 << 3;
    /// Process on the caller thread instead of the indexing queue.
    pub const NO_BLOCK: u32 = 1 << 4;
}

pub mod ctx_flags {
    /// Terms were consumed by a bulk merge; no more text work needed.
    pub const TEXT_INDEXED: u32 = 1 << 0;
    /// The context failed; it is skipped by every later stage.
    pub const ERRORED: u32 = 1 << 1;
    /// Non-text fields have been indexed.
    pub const OTHER_INDEXED: u32 = 1 << 2;
    /// Nothing indexable in the document.
    pub const EMPTY: u32 = 1 << 3;
}

/// Pre-extracted data for one non-full-text field, resolved on the caller
/// thread so the worker never consults the raw document.
#[derive(Debug, Clone)]
pub enum FieldIndexerData {
    Numeric { field: String, value: f64 },
    Tags { field: String, values: Vec<String> },
    Geo { field: String, lon: f64, lat: f64 },
}

pub type AddCompletion = Receiver<Result<DocId>>;

/// Everything one in-flight document add owns: its forward index, sorting
/// vector, byte offsets and completion channel. Tokenization happens at
/// construction, on the submitting thread; the indexing worker only merges
/// and writes.
pub struct AddDocumentCtx {
    pub doc: Document,
    pub doc_id: DocId,
    pub fwd: ForwardIndex,
    pub sort_vector: Option<SortingVector>,
    pub byte_offsets: Option<ByteOffsets>,
    pub field_data: Vec<FieldIndexerData>,
    pub options: u32,
    pub state_flags: u32,
    pub doc_flags: u32,
    pub status: Option<Error>,
    done: Sender<Result<DocId>>,
}

impl AddDocumentCtx {
    pub fn new(
        spec: &IndexSpec,
        mut doc: Document,
        mut options: u32,
    ) -> Result<(Box<AddDocumentCtx>, AddCompletion)> {
        if options & add_options::PARTIAL != 0 {
            options |= add_options::REPLACE;
        }
        if options & add_options::NOCREATE != 0 && options & add_options::REPLACE == 0 {
            return Err(Error::new(
                ErrorKind::AddArgs,
                "NOCREATE is only valid together with REPLACE",
            ));
        }
        if options & add_options::NOCREATE != 0
            && spec.inner.read().docs.get_by_key(&doc.key).is_none()
        {
            return Err(Error::new(
                ErrorKind::DocNotFound,
                format!("document `{}` does not exist", doc.key),
            ));
        }
        if options & add_options::PARTIAL != 0 {
            if let Some(old) = spec.doc_store.load(&doc.key) {
                doc.merge_missing(&old);
            }
        }

        let (tx, rx) = bounded(1);
        let mut ctx = Box::new(AddDocumentCtx {
            doc,
            doc_id: DocId(0),
            fwd: ForwardIndex::new(),
            sort_vector: None,
            byte_offsets: None,
            field_data: Vec::new(),
            options,
            state_flags: 0,
            doc_flags: 0,
            status: None,
            done: tx,
        });
        ctx.extract_fields(spec)?;
        Ok((ctx, rx))
    }

    /// Tokenize text fields and resolve typed values for the others.
    fn extract_fields(&mut self, spec: &IndexSpec) -> Result<()> {
        let analyzer = Analyzer::for_language(self.doc.language);
        let verbatim = Analyzer::verbatim();
        let mut offsets = ByteOffsetsWriter::new();
        let mut sv = SortingVector::new(spec.schema.num_sortables());
        let mut has_sortables = false;
        let mut position_base = 0u32;

        for (name, value) in self.doc.fields.clone() {
            let Some(fs) = spec.schema.field(&name) else {
                // Fields outside the schema are stored but not indexed.
                continue;
            };
            match fs.field_type {
                FieldType::FullText => {
                    let text = value.as_text().unwrap_or_default();
                    if let Some(ordinal) = fs.sort_ordinal {
                        sv.set(ordinal, Value::String(text.to_string()));
                        has_sortables = true;
                    }
                    if !fs.indexable {
                        continue;
                    }
                    let tokens = if fs.no_stem {
                        verbatim.analyze(text)
                    } else {
                        analyzer.analyze(text)
                    };
                    offsets.begin_field(fs.text_bit.unwrap_or(0), position_base);
                    let mut max_pos = 0u32;
                    for token in &tokens {
                        self.fwd.add_token(fs.mask_bit(), position_base, token);
                        offsets.record_token(token.position, token.byte_offset, token.byte_len);
                        max_pos = max_pos.max(token.position);
                    }
                    if !tokens.is_empty() {
                        position_base += max_pos + 1;
                    }
                }
                FieldType::Numeric => {
                    let parsed = match &value {
                        FieldValue::Numeric(n) => Some(*n),
                        FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
                        _ => None,
                    };
                    let Some(n) = parsed else {
                        return Err(Error::new(
                            ErrorKind::AddArgs,
                            format!("could not parse numeric value for field `{name}`"),
                        ));
                    };
                    if let Some(ordinal) = fs.sort_ordinal {
                        sv.set(ordinal, Value::Number(n));
                        has_sortables = true;
                    }
                    if fs.indexable {
                        self.field_data.push(FieldIndexerData::Numeric {
                            field: name.clone(),
                            value: n,
                        });
                    }
                }
                FieldType::Tag => {
                    let raw = value.as_text().unwrap_or_default();
                    let values = split_tags(raw, fs.tag_separator);
                    if fs.indexable && !values.is_empty() {
                        self.field_data.push(FieldIndexerData::Tags {
                            field: name.clone(),
                            values,
                        });
                    }
                }
                FieldType::Geo => {
                    let parsed = match &value {
                        FieldValue::Geo(lon, lat) => Some((*lon, *lat)),
                        FieldValue::Text(s) => {
                            let mut it = s.split(',').map(|p| p.trim().parse::<f64>());
                            match (it.next(), it.next()) {
                                (Some(Ok(lon)), Some(Ok(lat))) => Some((lon, lat)),
                                _ => None,
                            }
                        }
                        _ => None,
                    };
                    let Some((lon, lat)) = parsed else {
                        return Err(Error::new(
                            ErrorKind::AddArgs,
                            format!("could not parse geo value for field `{name}`"),
                        ));
                    };
                    self.field_data.push(FieldIndexerData::Geo {
                        field: name.clone(),
                        lon,
                        lat,
                    });
                    self.doc_flags |= doc_flags::HAS_ON_DEMAND_DELETABLE;
                }
            }
        }

        if has_sortables {
            self.sort_vector = Some(sv);
        }
        if !offsets.is_empty() {
            self.byte_offsets = Some(offsets.into_offsets());
        }
        if self.fwd.is_empty() && self.field_data.is_empty() && self.sort_vector.is_none() {
            self.state_flags |= ctx_flags::EMPTY;
        }
        Ok(())
    }

    pub fn is_blockable(&self) -> bool {
        self.options & add_options::NO_BLOCK == 0
    }

    pub fn is_errored(&self) -> bool {
        self.state_flags & ctx_flags::ERRORED != 0
    }

    pub fn mark_error(&mut self, err: Error) {
        self.state_flags |= ctx_flags::ERRORED;
        if self.status.is_none() {
            self.status = Some(err);
        }
    }

    /// Signal the waiting client with the final status. Consumes the context.
    pub fn finish(mut self) {
        let result = match self.status.take() {
            Some(err) => Err(err),
            None => Ok(self.doc_id),
        };
        let _ = self.done.send(result);
    }
}
