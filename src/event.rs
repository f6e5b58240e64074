//! E-commerce event model.
//!
//! An [`Event`] is a tagged record describing one occurrence on the store:
//! a purchase, a product view, an inventory update, or a user rating. The
//! matcher addresses event fields by name, so this module also provides the
//! dynamic `field_name -> value` extraction the predicate language relies on.

use serde::{Deserialize, Serialize};

/// Fields coerced numerically during condition evaluation.
///
/// Every other field compares as a string (lexicographically for the
/// ordering operators).
pub const NUMERIC_FIELDS: [&str; 5] = [
    "price",
    "stock_level",
    "rating",
    "quantity",
    "view_duration",
];

/// Returns true when conditions on `field_name` coerce both sides to floats.
#[must_use]
pub fn is_numeric_field(field_name: &str) -> bool {
    NUMERIC_FIELDS.contains(&field_name)
}

/// The variant tag of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Purchase,
    ProductView,
    InventoryUpdate,
    UserRating,
}

impl EventKind {
    /// Stable wire ordinal for binary-schema compatibility.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Purchase => 0,
            Self::ProductView => 1,
            Self::InventoryUpdate => 2,
            Self::UserRating => 3,
        }
    }

    /// Inverse of [`EventKind::wire_code`].
    #[must_use]
    pub const fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Purchase),
            1 => Some(Self::ProductView),
            2 => Some(Self::InventoryUpdate),
            3 => Some(Self::UserRating),
            _ => None,
        }
    }
}

/// A completed purchase.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub user_id: String,
    pub product_id: String,
    pub category: String,
    pub price: f64,
    pub quantity: i64,
    pub warehouse_id: String,
}

/// A product page view. `view_duration` is in seconds.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub user_id: String,
    pub product_id: String,
    pub category: String,
    pub view_duration: i64,
    pub source: String,
}

/// A warehouse stock change.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub product_id: String,
    pub category: String,
    pub stock_level: i64,
    pub warehouse_id: String,
    pub operation: String,
}

/// A user review. `rating` is in `[1.0, 5.0]`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRating {
    pub user_id: String,
    pub product_id: String,
    pub category: String,
    pub rating: f64,
    pub review_text: String,
}

/// Variant-specific payload of an event. Exactly one variant is present.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Purchase(Purchase),
    ProductView(ProductView),
    InventoryUpdate(InventoryUpdate),
    UserRating(UserRating),
}

/// One e-commerce event as consumed from the ingress collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque id, unique per emitter.
    pub event_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Variant payload.
    pub payload: EventPayload,
}

/// A field value borrowed from an event during condition evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// String-typed field.
    Str(&'a str),
    /// Integer-typed field.
    Int(i64),
    /// Float-typed field.
    Float(f64),
}

impl FieldValue<'_> {
    /// Numeric coercion. String values parse as floats; failure is `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
        }
    }
}

impl std::fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Event {
    /// Returns the variant tag.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Purchase(_) => EventKind::Purchase,
            EventPayload::ProductView(_) => EventKind::ProductView,
            EventPayload::InventoryUpdate(_) => EventKind::InventoryUpdate,
            EventPayload::UserRating(_) => EventKind::UserRating,
        }
    }

    /// Looks up a field by name on the current variant.
    ///
    /// Returns `None` when the field is not defined for this variant; the
    /// matcher treats that as a failed condition, never as an error.
    #[must_use]
    pub fn field(&self, field_name: &str) -> Option<FieldValue<'_>> {
        match &self.payload {
            EventPayload::Purchase(p) => match field_name {
                "user_id" => Some(FieldValue::Str(&p.user_id)),
                "product_id" => Some(FieldValue::Str(&p.product_id)),
                "category" => Some(FieldValue::Str(&p.category)),
                "price" => Some(FieldValue::Float(p.price)),
                "quantity" => Some(FieldValue::Int(p.quantity)),
                "warehouse_id" => Some(FieldValue::Str(&p.warehouse_id)),
                _ => None,
            },
            EventPayload::ProductView(v) => match field_name {
                "user_id" => Some(FieldValue::Str(&v.user_id)),
                "product_id" => Some(FieldValue::Str(&v.product_id)),
                "category" => Some(FieldValue::Str(&v.category)),
                "view_duration" => Some(FieldValue::Int(v.view_duration)),
                "source" => Some(FieldValue::Str(&v.source)),
                _ => None,
            },
            EventPayload::InventoryUpdate(u) => match field_name {
                "product_id" => Some(FieldValue::Str(&u.product_id)),
                "category" => Some(FieldValue::Str(&u.category)),
                "stock_level" => Some(FieldValue::Int(u.stock_level)),
                "warehouse_id" => Some(FieldValue::Str(&u.warehouse_id)),
                "operation" => Some(FieldValue::Str(&u.operation)),
                _ => None,
            },
            EventPayload::UserRating(r) => match field_name {
                "user_id" => Some(FieldValue::Str(&r.user_id)),
                "product_id" => Some(FieldValue::Str(&r.product_id)),
                "category" => Some(FieldValue::Str(&r.category)),
                "rating" => Some(FieldValue::Float(r.rating)),
                "review_text" => Some(FieldValue::Str(&r.review_text)),
                _ => None,
            },
        }
    }

    /// Looks up a field and coerces it numerically.
    #[must_use]
    pub fn numeric_field(&self, field_name: &str) -> Option<f64> {
        self.field(field_name).and_then(|v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase_event() -> Event {
        Event {
            event_id: "evt_1".to_string(),
            timestamp_ms: 1_700_000_000_000,
            payload: EventPayload::Purchase(Purchase {
                user_id: "user_42".to_string(),
                product_id: "prod_7".to_string(),
                category: "Electronics".to_string(),
                price: 750.0,
                quantity: 2,
                warehouse_id: "wh_east".to_string(),
            }),
        }
    }

    #[test]
    fn field_extraction_covers_purchase_columns() {
        let event = purchase_event();
        assert_eq!(event.kind(), EventKind::Purchase);
        assert_eq!(event.field("category"), Some(FieldValue::Str("Electronics")));
        assert_eq!(event.field("price"), Some(FieldValue::Float(750.0)));
        assert_eq!(event.field("quantity"), Some(FieldValue::Int(2)));
        assert_eq!(event.field("warehouse_id"), Some(FieldValue::Str("wh_east")));
    }

    #[test]
    fn absent_field_yields_none() {
        let event = purchase_event();
        // `rating` belongs to UserRating, `source` to ProductView.
        assert_eq!(event.field("rating"), None);
        assert_eq!(event.field("source"), None);
        assert_eq!(event.field("no_such_field"), None);
    }

    #[test]
    fn numeric_coercion() {
        let event = purchase_event();
        assert_eq!(event.numeric_field("price"), Some(750.0));
        assert_eq!(event.numeric_field("quantity"), Some(2.0));
        // Non-numeric strings fail coercion rather than erroring.
        assert_eq!(event.numeric_field("category"), None);
    }

    #[test]
    fn numeric_field_set_is_exact() {
        assert!(is_numeric_field("price"));
        assert!(is_numeric_field("view_duration"));
        assert!(!is_numeric_field("category"));
        assert!(!is_numeric_field("avg_rating"));
    }

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(EventKind::Purchase.wire_code(), 0);
        assert_eq!(EventKind::ProductView.wire_code(), 1);
        assert_eq!(EventKind::InventoryUpdate.wire_code(), 2);
        assert_eq!(EventKind::UserRating.wire_code(), 3);
        for code in 0..4u8 {
            let kind = EventKind::from_wire_code(code).unwrap();
            assert_eq!(kind.wire_code(), code);
        }
        assert_eq!(EventKind::from_wire_code(4), None);
    }

    #[test]
    fn serde_roundtrip_is_identity() {
        let event = Event {
            event_id: "evt_2".to_string(),
            timestamp_ms: 1_700_000_000_500,
            payload: EventPayload::UserRating(UserRating {
                user_id: "user_1".to_string(),
                product_id: "prod_9".to_string(),
                category: "Books".to_string(),
                rating: 4.5,
                review_text: "solid".to_string(),
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, decoded);
    }
}
