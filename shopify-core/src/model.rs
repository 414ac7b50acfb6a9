//! Typed records produced by bulk exports.
//!
//! Parent schemas implement [`BulkRecord`] with a table of the child
//! collections they accept. Child collections are named after the child
//! resource type, pluralized (`Metafields`, `ProductVariants`, ...), and are
//! empty until the reconciler attaches the matching child lines.
//!
//! Only direct children of top-level records are reconciled. When a type is
//! itself attached as a child, its own collections (such as
//! [`ProductVariant::metafields`] under a product export) stay empty, and a
//! line whose `__parentId` names that child is reported as
//! [`OrphanedChildren`](crate::bulkapi::reconcile::Error::OrphanedChildren).

use crate::bulkapi::reconcile::{into_children, BulkRecord, ChildField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub legacy_resource_id: Option<String>,
    pub title: String,
    pub handle: String,
    pub description_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub total_inventory: Option<i64>,
    pub online_store_url: Option<String>,
    pub template_suffix: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metafields: Vec<Metafield>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<ProductVariant>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<Collection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ProductImage>,
}

impl BulkRecord for Product {
    const CHILD_FIELDS: &'static [ChildField<Self>] = &[
        ChildField {
            name: "Metafields",
            attach: |product, children| {
                product.metafields = into_children(children)?;
                Ok(())
            },
        },
        ChildField {
            name: "ProductVariants",
            attach: |product, children| {
                product.variants = into_children(children)?;
                Ok(())
            },
        },
        ChildField {
            name: "Collections",
            attach: |product, children| {
                product.collections = into_children(children)?;
                Ok(())
            },
        },
        ChildField {
            name: "ProductImages",
            attach: |product, children| {
                product.images = into_children(children)?;
                Ok(())
            },
        },
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

/// A product variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    pub legacy_resource_id: Option<String>,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: Option<String>,
    pub compare_at_price: Option<String>,
    pub position: Option<i64>,
    pub inventory_quantity: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metafields: Vec<Metafield>,
}

impl BulkRecord for ProductVariant {
    const CHILD_FIELDS: &'static [ChildField<Self>] = &[ChildField {
        name: "Metafields",
        attach: |variant, children| {
            variant.metafields = into_children(children)?;
            Ok(())
        },
    }];

    fn id(&self) -> &str {
        &self.id
    }
}

/// An image attached to a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductImage {
    pub id: String,
    pub alt_text: Option<String>,
    pub src: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// A collection of products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub legacy_resource_id: Option<String>,
    pub title: String,
    pub handle: String,
    pub description_html: Option<String>,
    pub sort_order: Option<String>,
    pub template_suffix: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<Product>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metafields: Vec<Metafield>,
}

impl BulkRecord for Collection {
    const CHILD_FIELDS: &'static [ChildField<Self>] = &[
        ChildField {
            name: "Products",
            attach: |collection, children| {
                collection.products = into_children(children)?;
                Ok(())
            },
        },
        ChildField {
            name: "Metafields",
            attach: |collection, children| {
                collection.metafields = into_children(children)?;
                Ok(())
            },
        },
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

/// A custom key/value attached to another resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metafield {
    pub id: String,
    pub namespace: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub legacy_resource_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub display_financial_status: Option<String>,
    pub display_fulfillment_status: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metafields: Vec<Metafield>,
}

impl BulkRecord for Order {
    const CHILD_FIELDS: &'static [ChildField<Self>] = &[
        ChildField {
            name: "LineItems",
            attach: |order, children| {
                order.line_items = into_children(children)?;
                Ok(())
            },
        },
        ChildField {
            name: "Metafields",
            attach: |order, children| {
                order.metafields = into_children(children)?;
                Ok(())
            },
        },
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

/// A line item of an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub variant_title: Option<String>,
    pub sku: Option<String>,
    pub vendor: Option<String>,
    pub quantity: i64,
    pub current_quantity: Option<i64>,
}

/// A line item of a fulfillment order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FulfillmentOrderLineItem {
    pub id: String,
    pub total_quantity: i64,
    pub remaining_quantity: i64,
}
