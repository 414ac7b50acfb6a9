//! Rebuilds nested records from a bulk operation's JSONL result.
//!
//! Bulk exports flatten nested connections: every child node is written on
//! its own line with a `__parentId` pointing at its owner, after (or
//! interleaved with) the top-level lines. The [`Reconciler`] makes a single
//! forward pass, buffering children by parent id and collection name, and
//! attaches them once the input is exhausted.
//!
//! ```
//! use shopify_core::bulkapi::reconcile::parse_str;
//! use shopify_core::model::Order;
//!
//! let jsonl = r#"{"id":"gid://shopify/Order/1","name":"R1001"}
//! {"id":"gid://shopify/LineItem/10","name":"Shirt","quantity":2,"__parentId":"gid://shopify/Order/1"}
//! "#;
//!
//! let orders: Vec<Order> = parse_str(jsonl).unwrap();
//! assert_eq!(orders[0].line_items[0].quantity, 2);
//! ```

use super::resolver::{self, ChildRecord, FromChild};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Field carrying the owning parent's identifier on child lines.
pub const PARENT_ID_FIELD: &str = "__parentId";

/// Field carrying a record's own identifier.
pub const ID_FIELD: &str = "id";

/// Errors that can occur while reconciling a bulk result.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Reading the result stream failed.
    #[error("failed to read bulk result: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },

    /// A line is not valid JSON or does not match its schema.
    #[error("line {line}: {source}")]
    Json {
        /// 1-based line number.
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A child line's `__parentId` is not a string.
    #[error("line {line}: `__parentId` must be a string")]
    InvalidParentId {
        /// 1-based line number.
        line: usize,
    },

    /// A child line lacks the `id` field needed to resolve its type.
    #[error("line {line}: connection type must query the `id` field")]
    MissingChildId {
        /// 1-based line number.
        line: usize,
    },

    /// A child identifier is malformed or names an unsupported type.
    #[error("line {line}: {source}")]
    Resolve {
        /// 1-based line number.
        line: usize,
        #[source]
        source: resolver::Error,
    },

    /// A top-level record has no identifier to match children against.
    #[error("top-level record #{index} of {parent} has no id")]
    MissingParentId {
        /// 0-based position among top-level records.
        index: usize,
        /// Parent type name.
        parent: &'static str,
    },

    /// Child lines reference a parent that never appeared.
    #[error("{count} child record(s) reference missing parent `{parent_id}`")]
    OrphanedChildren {
        /// The unmatched parent identifier.
        parent_id: String,
        /// Number of children buffered for it.
        count: usize,
    },

    /// The parent type has no collection for a child type.
    #[error("field '{field}' not defined on the parent type {parent}")]
    UnknownField {
        /// Collection name derived from the child type.
        field: &'static str,
        /// Parent type name.
        parent: &'static str,
    },

    /// A collection received a child of a different type.
    #[error("expected {expected} children, found {found}")]
    ChildTypeMismatch {
        /// Type the collection holds.
        expected: &'static str,
        /// Type that was offered.
        found: &'static str,
    },

    /// An earlier line already failed; the reconciler accepts no more input.
    #[error("reconciler already failed on an earlier line")]
    Poisoned,
}

/// A top-level record type that child lines can be attached to.
pub trait BulkRecord: DeserializeOwned + Sized + 'static {
    /// Child collections this type accepts, by name.
    const CHILD_FIELDS: &'static [ChildField<Self>];

    /// Identifier used to match child lines' `__parentId`.
    fn id(&self) -> &str;
}

/// A named child collection on a parent type, with its setter.
pub struct ChildField<P> {
    /// Collection name, e.g. `LineItems`.
    pub name: &'static str,
    /// Replaces the collection with the given children.
    pub attach: fn(&mut P, Vec<ChildRecord>) -> Result<(), Error>,
}

/// Unwraps buffered children into their concrete type.
pub fn into_children<T: FromChild>(children: Vec<ChildRecord>) -> Result<Vec<T>, Error> {
    children
        .into_iter()
        .map(|child| {
            T::from_child(child).map_err(|other| Error::ChildTypeMismatch {
                expected: T::KIND.tag(),
                found: other.kind().tag(),
            })
        })
        .collect()
}

/// Children buffered for one parent, keyed by collection name.
type ChildCollections = HashMap<&'static str, Vec<ChildRecord>>;

/// Single-pass reconciler for bulk result lines.
///
/// Feed lines with [`push_line`](Self::push_line) in stream order and call
/// [`finish`](Self::finish) once the input is exhausted. After a failed
/// line, every further call returns [`Error::Poisoned`]; partial output is
/// never returned.
pub struct Reconciler<P> {
    parents: Vec<P>,
    children: HashMap<String, ChildCollections>,
    lines: usize,
    child_count: usize,
    failed: bool,
}

impl<P: BulkRecord> Default for Reconciler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: BulkRecord> Reconciler<P> {
    /// Creates an empty reconciler.
    pub fn new() -> Self {
        Self {
            parents: Vec::new(),
            children: HashMap::new(),
            lines: 0,
            child_count: 0,
            failed: false,
        }
    }

    /// Classifies and decodes one line. Blank lines are skipped.
    pub fn push_line(&mut self, line: &str) -> Result<(), Error> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        let result = self.classify(line);
        self.failed = result.is_err();
        result
    }

    fn classify(&mut self, line: &str) -> Result<(), Error> {
        self.lines += 1;
        let line_no = self.lines;
        if line.trim().is_empty() {
            return Ok(());
        }

        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|source| Error::Json {
                line: line_no,
                source,
            })?;

        let Some(parent_id) = value.get(PARENT_ID_FIELD) else {
            let parent = serde_json::from_value(value).map_err(|source| Error::Json {
                line: line_no,
                source,
            })?;
            self.parents.push(parent);
            return Ok(());
        };

        let parent_id = parent_id
            .as_str()
            .ok_or(Error::InvalidParentId { line: line_no })?
            .to_string();
        let gid = value
            .get(ID_FIELD)
            .and_then(serde_json::Value::as_str)
            .ok_or(Error::MissingChildId { line: line_no })?;
        let kind = resolver::resolve(gid).map_err(|source| Error::Resolve {
            line: line_no,
            source,
        })?;
        let record = kind.decode(value).map_err(|source| Error::Json {
            line: line_no,
            source,
        })?;

        self.children
            .entry(parent_id)
            .or_default()
            .entry(kind.field_name())
            .or_default()
            .push(record);
        self.child_count += 1;
        Ok(())
    }

    /// Attaches buffered children to their parents and returns the parents in
    /// stream order.
    pub fn finish(self) -> Result<Vec<P>, Error> {
        let Self {
            mut parents,
            mut children,
            lines,
            child_count,
            failed,
        } = self;
        if failed {
            return Err(Error::Poisoned);
        }

        if !children.is_empty() {
            for (index, parent) in parents.iter_mut().enumerate() {
                if parent.id().is_empty() {
                    return Err(Error::MissingParentId {
                        index,
                        parent: std::any::type_name::<P>(),
                    });
                }
                let Some(collections) = children.remove(parent.id()) else {
                    continue;
                };
                for (field, records) in collections {
                    attach(parent, field, records)?;
                }
            }

            if let Some((parent_id, collections)) = children.into_iter().next() {
                return Err(Error::OrphanedChildren {
                    parent_id,
                    count: collections.values().map(Vec::len).sum(),
                });
            }
        }

        tracing::debug!(
            lines,
            parents = parents.len(),
            children = child_count,
            "reconciled bulk result"
        );
        Ok(parents)
    }
}

fn attach<P: BulkRecord>(
    parent: &mut P,
    field: &'static str,
    records: Vec<ChildRecord>,
) -> Result<(), Error> {
    let child_field = P::CHILD_FIELDS
        .iter()
        .find(|candidate| candidate.name == field)
        .ok_or(Error::UnknownField {
            field,
            parent: std::any::type_name::<P>(),
        })?;
    (child_field.attach)(parent, records)
}

/// Reconciles every line of `reader`.
#[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
pub async fn parse_reader<P, R>(reader: R) -> Result<Vec<P>, Error>
where
    P: BulkRecord,
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut reconciler = Reconciler::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|source| Error::Io { source })?
    {
        reconciler.push_line(&line)?;
    }
    reconciler.finish()
}

/// Reconciles a result file on disk.
pub async fn parse_file<P: BulkRecord>(path: &Path) -> Result<Vec<P>, Error> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| Error::Io { source })?;
    parse_reader(tokio::io::BufReader::new(file)).await
}

/// Reconciles an in-memory result.
pub fn parse_str<P: BulkRecord>(input: &str) -> Result<Vec<P>, Error> {
    let mut reconciler = Reconciler::new();
    for line in input.lines() {
        reconciler.push_line(line)?;
    }
    reconciler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Collection, Order, Product};

    const ORDERS: &str = r#"{"id":"gid://x/Order/1","name":"R1001"}
{"id":"gid://x/LineItem/11","name":"first","quantity":1,"__parentId":"gid://x/Order/1"}
{"id":"gid://x/Order/2","name":"R1002"}
{"id":"gid://x/LineItem/21","name":"other","quantity":5,"__parentId":"gid://x/Order/2"}
{"id":"gid://x/LineItem/12","name":"second","quantity":2,"__parentId":"gid://x/Order/1"}
"#;

    #[test]
    fn test_children_attached_in_stream_order() {
        let orders: Vec<Order> = parse_str(ORDERS).unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, "gid://x/Order/1");
        assert_eq!(orders[1].id, "gid://x/Order/2");

        let names: Vec<&str> = orders[0].line_items.iter().map(|li| li.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(orders[1].line_items.len(), 1);
        assert_eq!(orders[1].line_items[0].quantity, 5);
    }

    #[test]
    fn test_multiple_collections_on_one_parent() {
        let jsonl = r#"{"id":"gid://shopify/Product/1","title":"Shirt","handle":"shirt"}
{"id":"gid://shopify/ProductVariant/1","title":"S","__parentId":"gid://shopify/Product/1"}
{"id":"gid://shopify/Metafield/1","namespace":"a","key":"b","value":"c","__parentId":"gid://shopify/Product/1"}
{"id":"gid://shopify/ProductVariant/2","title":"M","__parentId":"gid://shopify/Product/1"}
{"id":"gid://shopify/ProductImage/1","src":"https://cdn/img.png","__parentId":"gid://shopify/Product/1"}
{"id":"gid://shopify/Collection/1","title":"Summer","handle":"summer","__parentId":"gid://shopify/Product/1"}
{"id":"gid://shopify/Product/2","title":"Hat","handle":"hat"}
"#;
        let products: Vec<Product> = parse_str(jsonl).unwrap();

        assert_eq!(products.len(), 2);
        let shirt = &products[0];
        assert_eq!(
            shirt.variants.iter().map(|v| v.title.as_str()).collect::<Vec<_>>(),
            vec!["S", "M"]
        );
        assert_eq!(shirt.metafields.len(), 1);
        assert_eq!(shirt.images[0].src.as_deref(), Some("https://cdn/img.png"));
        assert_eq!(shirt.collections[0].handle, "summer");
        assert!(products[1].variants.is_empty());
    }

    #[test]
    fn test_children_before_parent() {
        let jsonl = r#"{"id":"gid://x/LineItem/1","name":"early","quantity":1,"__parentId":"gid://x/Order/1"}
{"id":"gid://x/Order/1","name":"R1"}"#;
        let orders: Vec<Order> = parse_str(jsonl).unwrap();
        assert_eq!(orders[0].line_items[0].name, "early");
    }

    #[test]
    fn test_no_children_keeps_parents() {
        let jsonl = "{\"id\":\"gid://x/Order/1\"}\n\n{\"id\":\"gid://x/Order/2\"}";
        let orders: Vec<Order> = parse_str(jsonl).unwrap();
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let orders: Vec<Order> = parse_str("").unwrap();
        assert!(orders.is_empty());
    }

    #[test]
    fn test_unknown_type_fails_whole_parse() {
        let jsonl = r#"{"id":"gid://x/Order/1"}
{"id":"gid://x/GiftCard/1","__parentId":"gid://x/Order/1"}
{"id":"gid://x/LineItem/1","quantity":1,"__parentId":"gid://x/Order/1"}
"#;
        let result = parse_str::<Order>(jsonl);
        match result {
            Err(Error::Resolve {
                line: 2,
                source: resolver::Error::UnknownResourceType { tag, .. },
            }) => assert_eq!(tag, "GiftCard"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_child_gid() {
        let jsonl = r#"{"id":"gid://x/Order/1"}
{"id":"LineItem-1","__parentId":"gid://x/Order/1"}"#;
        assert!(matches!(
            parse_str::<Order>(jsonl),
            Err(Error::Resolve {
                source: resolver::Error::MalformedGid(_),
                ..
            })
        ));
    }

    #[test]
    fn test_child_without_id() {
        let jsonl = r#"{"id":"gid://x/Order/1"}
{"name":"no id","__parentId":"gid://x/Order/1"}"#;
        assert!(matches!(
            parse_str::<Order>(jsonl),
            Err(Error::MissingChildId { line: 2 })
        ));
    }

    #[test]
    fn test_non_string_parent_id() {
        let jsonl = r#"{"id":"gid://x/LineItem/1","__parentId":7}"#;
        assert!(matches!(
            parse_str::<Order>(jsonl),
            Err(Error::InvalidParentId { line: 1 })
        ));
    }

    #[test]
    fn test_orphaned_children_fail() {
        let jsonl = r#"{"id":"gid://x/Order/1"}
{"id":"gid://x/LineItem/1","quantity":1,"__parentId":"gid://x/Order/1"}
{"id":"gid://x/LineItem/2","quantity":1,"__parentId":"gid://x/Order/404"}
{"id":"gid://x/LineItem/3","quantity":1,"__parentId":"gid://x/Order/404"}
"#;
        match parse_str::<Order>(jsonl) {
            Err(Error::OrphanedChildren { parent_id, count }) => {
                assert_eq!(parent_id, "gid://x/Order/404");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_failed_reconciler_rejects_further_input() {
        let mut reconciler = Reconciler::<Order>::new();
        reconciler.push_line(r#"{"id":"gid://x/Order/1"}"#).unwrap();
        assert!(matches!(
            reconciler.push_line(r#"{"id":"gid://x/GiftCard/1","__parentId":"gid://x/Order/1"}"#),
            Err(Error::Resolve { line: 2, .. })
        ));
        assert!(matches!(
            reconciler.push_line(
                r#"{"id":"gid://x/LineItem/1","quantity":1,"__parentId":"gid://x/Order/1"}"#
            ),
            Err(Error::Poisoned)
        ));
        assert!(matches!(reconciler.finish(), Err(Error::Poisoned)));
    }

    #[test]
    fn test_grandchildren_are_not_reconciled() {
        let jsonl = r#"{"id":"gid://shopify/Product/1","title":"Shirt","handle":"shirt"}
{"id":"gid://shopify/ProductVariant/1","title":"S","__parentId":"gid://shopify/Product/1"}
{"id":"gid://shopify/Metafield/1","namespace":"a","key":"b","value":"c","__parentId":"gid://shopify/ProductVariant/1"}
"#;
        match parse_str::<Product>(jsonl) {
            Err(Error::OrphanedChildren { parent_id, count }) => {
                assert_eq!(parent_id, "gid://shopify/ProductVariant/1");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parent_without_id_fails_when_children_present() {
        let jsonl = r#"{"name":"anonymous"}
{"id":"gid://x/LineItem/1","quantity":1,"__parentId":"gid://x/Order/1"}"#;
        assert!(matches!(
            parse_str::<Order>(jsonl),
            Err(Error::MissingParentId { index: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_field_on_parent() {
        let jsonl = r#"{"id":"gid://x/Collection/1","title":"c","handle":"c"}
{"id":"gid://x/LineItem/1","quantity":1,"__parentId":"gid://x/Collection/1"}"#;
        match parse_str::<Collection>(jsonl) {
            Err(Error::UnknownField { field, parent }) => {
                assert_eq!(field, "LineItems");
                assert!(parent.ends_with("Collection"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_json_line() {
        let jsonl = "{\"id\":\"gid://x/Order/1\"}\n{not json}\n";
        assert!(matches!(
            parse_str::<Order>(jsonl),
            Err(Error::Json { line: 2, .. })
        ));
    }

    #[test]
    fn test_child_schema_mismatch() {
        let jsonl = r#"{"id":"gid://x/Order/1"}
{"id":"gid://x/LineItem/1","quantity":"many","__parentId":"gid://x/Order/1"}"#;
        assert!(matches!(
            parse_str::<Order>(jsonl),
            Err(Error::Json { line: 2, .. })
        ));
    }

    #[test]
    fn test_into_children_type_mismatch() {
        let records = vec![ChildRecord::Metafield(Default::default())];
        let result = into_children::<crate::model::LineItem>(records);
        assert!(matches!(
            result,
            Err(Error::ChildTypeMismatch {
                expected: "LineItem",
                found: "Metafield"
            })
        ));
    }

    #[tokio::test]
    async fn test_parse_reader_handles_missing_trailing_newline() {
        let input = ORDERS.trim_end().as_bytes();
        let orders: Vec<Order> = parse_reader(tokio::io::BufReader::new(input)).await.unwrap();
        assert_eq!(orders[0].line_items.len(), 2);
    }

    #[tokio::test]
    async fn test_parse_reader_propagates_io_errors() {
        let input: &[u8] = b"{\"id\":\"gid://x/Order/1\"}\n\xff\xfe\n";
        let result = parse_reader::<Order, _>(tokio::io::BufReader::new(input)).await;
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[tokio::test]
    async fn test_parse_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), ORDERS).await.unwrap();
        let orders: Vec<Order> = parse_file(file.path()).await.unwrap();
        assert_eq!(orders.len(), 2);
    }
}
