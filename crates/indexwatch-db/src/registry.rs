//! Target schema registry.
//!
//! One const table per logical database listing the secondary indexes the
//! application requires. The migration coordinator walks these tables with a
//! single generic routine instead of one hand-written upgrade function per
//! database, so adding an index is a one-line table edit.

use crate::engine::IndexSpec;

/// Logical databases in migration order. The coordinator always walks this
/// list front to back so failures are attributable to a fixed position.
pub const DATABASES: &[&str] = &["posDB", "salesDB", "customersDB"];

// =============================================================================
// Per-database index targets
// =============================================================================

/// Product catalog lookups: barcode scans and group membership joins.
const POS_DB_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        store: "products",
        name: "barcode",
        key_paths: &["barcode"],
        unique: true,
    },
    IndexSpec {
        store: "products",
        name: "productGroupId",
        key_paths: &["productGroupId"],
        unique: false,
    },
    IndexSpec {
        store: "productGroupRelations",
        name: "groupId",
        key_paths: &["groupId"],
        unique: false,
    },
    IndexSpec {
        store: "productGroupRelations",
        name: "productId",
        key_paths: &["productId"],
        unique: false,
    },
];

/// Sales history: date-range reports and per-customer lookups, plus the
/// sale -> line-items join.
const SALES_DB_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        store: "sales",
        name: "date",
        key_paths: &["date"],
        unique: false,
    },
    IndexSpec {
        store: "sales",
        name: "customerId",
        key_paths: &["customerId"],
        unique: false,
    },
    IndexSpec {
        store: "saleItems",
        name: "saleId",
        key_paths: &["saleId"],
        unique: false,
    },
    IndexSpec {
        store: "saleItems",
        name: "productId",
        key_paths: &["productId"],
        unique: false,
    },
];

/// Customer directory: contact-field lookups at the register.
const CUSTOMERS_DB_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        store: "customers",
        name: "phone",
        key_paths: &["phone"],
        unique: false,
    },
    IndexSpec {
        store: "customers",
        name: "email",
        key_paths: &["email"],
        unique: true,
    },
    IndexSpec {
        store: "customers",
        name: "lastName",
        key_paths: &["lastName"],
        unique: false,
    },
];

/// Target index list for `database`, empty for databases the registry does
/// not manage.
#[must_use]
pub fn target_indexes(database: &str) -> &'static [IndexSpec] {
    match database {
        "posDB" => POS_DB_INDEXES,
        "salesDB" => SALES_DB_INDEXES,
        "customersDB" => CUSTOMERS_DB_INDEXES,
        _ => &[],
    }
}
