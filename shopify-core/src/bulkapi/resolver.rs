//! Maps a child record's resource-type tag to its schema and parent field.

use crate::gid::{self, Gid};
use crate::model::{
    Collection, FulfillmentOrderLineItem, LineItem, Metafield, Order, Product, ProductImage,
    ProductVariant,
};

/// Error returned when a child identifier cannot be resolved to a schema.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The identifier is not a well-formed global identifier.
    #[error(transparent)]
    MalformedGid(#[from] gid::Error),
    /// The identifier names a resource type without a known schema.
    #[error("`{tag}` is not a supported bulk child type (gid `{gid}`)")]
    UnknownResourceType {
        /// The unrecognised resource-type tag.
        tag: String,
        /// The full identifier it came from.
        gid: String,
    },
}

/// Resource types that may appear as child lines in a bulk result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    LineItem,
    FulfillmentOrderLineItem,
    Metafield,
    Order,
    Product,
    ProductVariant,
    Collection,
    ProductImage,
}

impl ResourceKind {
    /// Looks up a resource-type tag. Unknown tags return `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "LineItem" => Some(Self::LineItem),
            "FulfillmentOrderLineItem" => Some(Self::FulfillmentOrderLineItem),
            "Metafield" => Some(Self::Metafield),
            "Order" => Some(Self::Order),
            "Product" => Some(Self::Product),
            "ProductVariant" => Some(Self::ProductVariant),
            "Collection" => Some(Self::Collection),
            "ProductImage" => Some(Self::ProductImage),
            _ => None,
        }
    }

    /// Returns the resource-type tag as it appears in identifiers.
    pub fn tag(self) -> &'static str {
        match self {
            Self::LineItem => "LineItem",
            Self::FulfillmentOrderLineItem => "FulfillmentOrderLineItem",
            Self::Metafield => "Metafield",
            Self::Order => "Order",
            Self::Product => "Product",
            Self::ProductVariant => "ProductVariant",
            Self::Collection => "Collection",
            Self::ProductImage => "ProductImage",
        }
    }

    /// Returns the parent collection field this kind is attached to: the tag, pluralized.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::LineItem => "LineItems",
            Self::FulfillmentOrderLineItem => "FulfillmentOrderLineItems",
            Self::Metafield => "Metafields",
            Self::Order => "Orders",
            Self::Product => "Products",
            Self::ProductVariant => "ProductVariants",
            Self::Collection => "Collections",
            Self::ProductImage => "ProductImages",
        }
    }

    /// Decodes a JSON object against this kind's schema.
    pub fn decode(self, value: serde_json::Value) -> Result<ChildRecord, serde_json::Error> {
        Ok(match self {
            Self::LineItem => ChildRecord::LineItem(serde_json::from_value(value)?),
            Self::FulfillmentOrderLineItem => {
                ChildRecord::FulfillmentOrderLineItem(serde_json::from_value(value)?)
            }
            Self::Metafield => ChildRecord::Metafield(serde_json::from_value(value)?),
            Self::Order => ChildRecord::Order(serde_json::from_value(value)?),
            Self::Product => ChildRecord::Product(serde_json::from_value(value)?),
            Self::ProductVariant => ChildRecord::ProductVariant(serde_json::from_value(value)?),
            Self::Collection => ChildRecord::Collection(serde_json::from_value(value)?),
            Self::ProductImage => ChildRecord::ProductImage(serde_json::from_value(value)?),
        })
    }
}

/// Resolves a child identifier to its resource kind.
pub fn resolve(gid: &str) -> Result<ResourceKind, Error> {
    let parsed: Gid = gid.parse()?;
    ResourceKind::from_tag(parsed.resource_type()).ok_or_else(|| Error::UnknownResourceType {
        tag: parsed.resource_type().to_string(),
        gid: gid.to_string(),
    })
}

/// A decoded child line.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRecord {
    LineItem(LineItem),
    FulfillmentOrderLineItem(FulfillmentOrderLineItem),
    Metafield(Metafield),
    Order(Order),
    Product(Product),
    ProductVariant(ProductVariant),
    Collection(Collection),
    ProductImage(ProductImage),
}

impl ChildRecord {
    /// Returns the kind this record was decoded as.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::LineItem(_) => ResourceKind::LineItem,
            Self::FulfillmentOrderLineItem(_) => ResourceKind::FulfillmentOrderLineItem,
            Self::Metafield(_) => ResourceKind::Metafield,
            Self::Order(_) => ResourceKind::Order,
            Self::Product(_) => ResourceKind::Product,
            Self::ProductVariant(_) => ResourceKind::ProductVariant,
            Self::Collection(_) => ResourceKind::Collection,
            Self::ProductImage(_) => ResourceKind::ProductImage,
        }
    }
}

/// A concrete schema that a [`ChildRecord`] can be unwrapped into.
pub trait FromChild: Sized {
    /// The kind whose records unwrap into `Self`.
    const KIND: ResourceKind;

    /// Unwraps the record, handing it back unchanged if it is another kind.
    fn from_child(child: ChildRecord) -> Result<Self, ChildRecord>;
}

macro_rules! impl_from_child {
    ($($variant:ident),* $(,)?) => {
        $(
            impl FromChild for $variant {
                const KIND: ResourceKind = ResourceKind::$variant;

                fn from_child(child: ChildRecord) -> Result<Self, ChildRecord> {
                    match child {
                        ChildRecord::$variant(record) => Ok(record),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_from_child!(
    LineItem,
    FulfillmentOrderLineItem,
    Metafield,
    Order,
    Product,
    ProductVariant,
    Collection,
    ProductImage,
);

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ResourceKind; 8] = [
        ResourceKind::LineItem,
        ResourceKind::FulfillmentOrderLineItem,
        ResourceKind::Metafield,
        ResourceKind::Order,
        ResourceKind::Product,
        ResourceKind::ProductVariant,
        ResourceKind::Collection,
        ResourceKind::ProductImage,
    ];

    #[test]
    fn test_tags_round_trip_and_pluralize() {
        for kind in ALL {
            assert_eq!(ResourceKind::from_tag(kind.tag()), Some(kind));
            assert_eq!(kind.field_name(), format!("{}s", kind.tag()));
        }
    }

    #[test]
    fn test_resolve_known_type() {
        assert_eq!(
            resolve("gid://shopify/LineItem/12").unwrap(),
            ResourceKind::LineItem
        );
        assert_eq!(
            resolve("gid://x/ProductVariant/7").unwrap().field_name(),
            "ProductVariants"
        );
    }

    #[test]
    fn test_resolve_unknown_type_fails() {
        let err = resolve("gid://shopify/GiftCard/1").unwrap_err();
        assert_eq!(
            err,
            Error::UnknownResourceType {
                tag: "GiftCard".to_string(),
                gid: "gid://shopify/GiftCard/1".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_malformed_gid_fails() {
        assert!(matches!(
            resolve("gid://shopify/LineItem"),
            Err(Error::MalformedGid(_))
        ));
    }

    #[test]
    fn test_decode_and_unwrap() {
        let kind = ResourceKind::Metafield;
        let record = kind
            .decode(serde_json::json!({
                "id": "gid://shopify/Metafield/1",
                "namespace": "custom",
                "key": "color",
                "value": "red",
                "__parentId": "gid://shopify/Product/1"
            }))
            .unwrap();
        assert_eq!(record.kind(), ResourceKind::Metafield);

        let metafield = Metafield::from_child(record.clone()).unwrap();
        assert_eq!(metafield.key, "color");
        assert_eq!(LineItem::from_child(record.clone()), Err(record));
    }
}
