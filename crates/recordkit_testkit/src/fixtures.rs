//! Sales order fixtures and database helpers.
//!
//! A sales order (`sales_order`) owns its lines (`sales_order_detail`)
//! through the shared `order_id` business code, and moves through the
//! status lifecycle returned by [`sales_order_events`].

use recordkit_core::{
    after_every_event, AfterEventHook, Association, AuditFields, Config, Database, EngineError,
    EngineResult, Entity, Hooks, MemoryAuditSink, Model, RequestScope, SearchField, SearchSpec,
    Transition,
};
use recordkit_store::InMemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Status: drafted.
pub const STATUS_DRAFT: i64 = 0;
/// Status: confirmed.
pub const STATUS_CONFIRMED: i64 = 1;
/// Status: partly delivered.
pub const STATUS_PART_DELIVERED: i64 = 2;
/// Status: fully delivered.
pub const STATUS_DELIVERED: i64 = 3;
/// Status: signed for.
pub const STATUS_SIGNED: i64 = 4;
/// Status: receipt returned.
pub const STATUS_RECEIPTED: i64 = 5;
/// Status: goods returned.
pub const STATUS_RETURNED: i64 = 6;

/// The order lines association.
pub const SALES_ORDER_DETAILS: Association = Association::new(
    "sales_order_details",
    SalesOrderDetail::TABLE,
    "order_id",
    "order_id",
);

/// A sales order header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesOrder {
    /// Identifier and auditing columns.
    #[serde(flatten)]
    pub audit: AuditFields,
    /// Business code.
    #[serde(default)]
    pub order_id: String,
    /// Lifecycle status, see the `STATUS_*` constants.
    #[serde(default)]
    pub status: i64,
    /// Customer name.
    #[serde(default)]
    pub customer_name: String,
    /// Delivery address.
    #[serde(default)]
    pub address: String,
    /// Order lines.
    #[serde(default)]
    pub sales_order_details: Vec<SalesOrderDetail>,
}

impl Entity for SalesOrder {
    const TABLE: &'static str = "sales_order";

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    fn associations() -> &'static [Association] {
        &[SALES_ORDER_DETAILS]
    }

    fn validate(&self) -> EngineResult<()> {
        if self.order_id.trim().is_empty() {
            return Err(EngineError::validation(Self::TABLE, "order_id is required"));
        }
        if self.customer_name.chars().count() > 100 {
            return Err(EngineError::validation(
                Self::TABLE,
                format!("customer_name {:?} is longer than 100 characters", self.customer_name),
            ));
        }
        Ok(())
    }

    fn repair(&mut self) -> EngineResult<()> {
        self.order_id = self.order_id.trim().to_string();
        self.customer_name = self.customer_name.trim().to_string();
        Ok(())
    }

    fn complete(&mut self) -> EngineResult<()> {
        for line in &mut self.sales_order_details {
            line.order_id.clone_from(&self.order_id);
        }
        Ok(())
    }
}

/// One sales order line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesOrderDetail {
    /// Identifier and auditing columns.
    #[serde(flatten)]
    pub audit: AuditFields,
    /// Owning order's business code.
    #[serde(default)]
    pub order_id: String,
    /// SKU code.
    #[serde(default)]
    pub sku_code: String,
    /// Product name.
    #[serde(default)]
    pub product_name: String,
    /// Brand.
    #[serde(default)]
    pub brand_name: String,
    /// Model type.
    #[serde(default)]
    pub model_type: String,
    /// Ordered quantity.
    #[serde(default)]
    pub order_quantity: f64,
}

impl Entity for SalesOrderDetail {
    const TABLE: &'static str = "sales_order_detail";

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

/// Payload of a create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    /// Business code.
    pub order_id: String,
    /// Customer name.
    pub customer_name: String,
    /// Delivery address.
    pub address: String,
    /// Order lines.
    pub sales_order_details: Vec<CreateSalesOrderDetail>,
}

/// A line in a create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSalesOrderDetail {
    /// SKU code.
    pub sku_code: String,
    /// Product name.
    pub product_name: String,
    /// Ordered quantity.
    pub order_quantity: f64,
}

/// Payload of an update request; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSalesOrder {
    /// Customer name.
    pub customer_name: Option<String>,
    /// Delivery address.
    pub address: Option<String>,
}

/// A list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSalesOrder {
    /// Exact identifier.
    pub id: u64,
    /// 1-based page.
    pub page: u64,
    /// Rows per page.
    pub page_size: u64,
    /// Creation time range, `[from, to]`.
    pub created_at: Vec<String>,
    /// Exact business code.
    pub order_id: String,
    /// Exact customer name.
    pub customer_name: String,
    /// Customer name substring.
    pub customer_name_like: String,
    /// Exact address.
    pub address: String,
}

impl SearchSpec for SearchSalesOrder {
    fn search_fields(&self) -> Vec<SearchField> {
        let table = SalesOrder::TABLE;
        vec![
            SearchField::eq(table, "id", self.id),
            SearchField::page(self.page),
            SearchField::page_size(self.page_size),
            SearchField::between(table, "created_at", self.created_at.clone()),
            SearchField::eq(table, "order_id", self.order_id.clone()),
            SearchField::eq(table, "customer_name", self.customer_name.clone()),
            SearchField::like(table, "customer_name", self.customer_name_like.clone()),
            SearchField::eq(table, "address", self.address.clone()),
        ]
    }
}

/// The sales order lifecycle.
///
/// | event          | from      | to |
/// |----------------|-----------|----|
/// | `confirm`      | 0         | 1  |
/// | `partDelivery` | 1, 2      | 2  |
/// | `allDelivery`  | 1, 2      | 3  |
/// | `signFor`      | 3         | 4  |
/// | `back`         | 4         | 5  |
/// | `returnGoods`  | 4, 5      | 6  |
#[must_use]
pub fn sales_order_events() -> Vec<Transition> {
    vec![
        Transition::new([STATUS_DRAFT], "confirm", STATUS_CONFIRMED),
        Transition::new(
            [STATUS_CONFIRMED, STATUS_PART_DELIVERED],
            "partDelivery",
            STATUS_PART_DELIVERED,
        ),
        Transition::new(
            [STATUS_CONFIRMED, STATUS_PART_DELIVERED],
            "allDelivery",
            STATUS_DELIVERED,
        ),
        Transition::new([STATUS_DELIVERED], "signFor", STATUS_SIGNED),
        Transition::new([STATUS_SIGNED], "back", STATUS_RECEIPTED),
        Transition::new([STATUS_SIGNED, STATUS_RECEIPTED], "returnGoods", STATUS_RETURNED),
    ]
}

/// Copies the destination state into [`SalesOrder::status`].
#[must_use]
pub fn status_hook() -> AfterEventHook<SalesOrder> {
    after_every_event(|order: &mut SalesOrder, event| {
        if let Ok(status) = event.destination.parse() {
            order.status = status;
        }
    })
}

/// Binds a sales order model with the lifecycle attached.
pub fn sales_order_model(scope: &Arc<RequestScope>, order: SalesOrder) -> Model<SalesOrder> {
    let status = order.status;
    let mut model = Model::new(scope, order);
    model
        .init_state_machine(status, sales_order_events(), status_hook(), Hooks::new())
        .expect("freshly bound entity is registered");
    model
}

/// A sales order with `lines` generated lines.
#[must_use]
pub fn sample_order(order_id: &str, customer_name: &str, lines: usize) -> SalesOrder {
    SalesOrder {
        order_id: order_id.to_string(),
        customer_name: customer_name.to_string(),
        address: "1 Harbour Road".to_string(),
        sales_order_details: (1..=lines)
            .map(|n| SalesOrderDetail {
                sku_code: format!("SKU{n:03}"),
                product_name: format!("Product {n}"),
                order_quantity: n as f64,
                ..SalesOrderDetail::default()
            })
            .collect(),
        ..SalesOrder::default()
    }
}

/// An in-memory database that records audit entries.
pub struct TestDatabase {
    /// The database handle.
    pub db: Database,
    /// The backing store, for direct inspection.
    pub store: InMemoryStore,
    /// Every audit entry recorded so far.
    pub audit: Arc<MemoryAuditSink>,
}

impl TestDatabase {
    /// Creates a database with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a database with `config`.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let store = InMemoryStore::new();
        let audit = Arc::new(MemoryAuditSink::new());
        let db = Database::open_with_config(store.clone(), config).with_audit_sink(audit.clone());
        Self { db, store, audit }
    }

    /// Opens a request acting as `u1` / `Alice`.
    #[must_use]
    pub fn scope(&self) -> Arc<RequestScope> {
        self.db.request().actor("u1", "Alice").build()
    }

    /// Opens a request acting as `id` / `name`.
    #[must_use]
    pub fn scope_as(&self, id: &str, name: &str) -> Arc<RequestScope> {
        self.db.request().actor(id, name).build()
    }

    /// Opens a request without an actor.
    #[must_use]
    pub fn anonymous_scope(&self) -> Arc<RequestScope> {
        self.db.request().build()
    }

    /// Creates `order` in its own request and returns the stored value.
    pub fn seed(&self, order: SalesOrder) -> SalesOrder {
        let scope = self.scope();
        Model::new(&scope, order).create().expect("seed order")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}
