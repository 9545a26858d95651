//! Integration tests for order fulfillment over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use common::{ActorId, CustomerId, DeliveryStatus, ExportSource, Money, OrderId, ProductId};
use domain::{
    CreateOrder, DeleteOrder, DomainError, ErrorKind, InMemoryIdentityProvider,
    InMemoryProductCatalog, OrderLine, SourcingMode, UpdateOrder, UpdateQuantity,
};
use fulfillment::{CreatedOrder, FulfillmentConfig, InventoryService, OrderFulfillment};
use futures_util::future::join_all;
use store::{HistoryLog, InMemoryStore, Inventory, InventoryStore, OrderStore, Session, UnitOfWork};

struct TestHarness {
    store: InMemoryStore,
    engine: OrderFulfillment<InMemoryStore>,
    inventory: InventoryService<InMemoryStore>,
}

fn alice() -> Option<ActorId> {
    Some(ActorId::new(1))
}

fn customer() -> CustomerId {
    CustomerId::new(1)
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(FulfillmentConfig::default())
    }

    fn with_config(config: FulfillmentConfig) -> Self {
        let store = InMemoryStore::new();
        let identity = Arc::new(InMemoryIdentityProvider::new().with_user(ActorId::new(1), "alice"));
        let mut catalog = InMemoryProductCatalog::new();
        for id in 1..=5 {
            catalog = catalog.with_product(
                ProductId::new(id),
                format!("Product {id}"),
                Money::from_minor(100 * id),
            );
        }

        let engine = OrderFulfillment::new(
            store.clone(),
            identity.clone(),
            Arc::new(catalog),
            config.clone(),
        );
        let inventory = InventoryService::new(store.clone(), identity, config);

        Self {
            store,
            engine,
            inventory,
        }
    }

    async fn stock(&self, id: i64, quantity: i64) -> Inventory {
        self.store.seed_inventory(ProductId::new(id), quantity).await
    }

    async fn current(&self, id: i64) -> Inventory {
        self.store.get_by_product(ProductId::new(id)).await.unwrap()
    }

    async fn take(&self, id: i64, quantity: i64) -> Result<CreatedOrder, DomainError> {
        let row = self.current(id).await;
        self.engine
            .create_order(CreateOrder::new(alice(), customer()).line(OrderLine::inventory(
                ProductId::new(id),
                quantity,
                Money::from_minor(150),
                row.version,
            )))
            .await
    }

    /// Every product's history deltas add up to its current quantity.
    async fn assert_ledger_balanced(&self) {
        for row in self.store.inventory_rows().await {
            let history = self.store.list_for_product(row.product_id).await.unwrap();
            let total: i64 = history.iter().map(|e| e.quantity).sum();
            assert_eq!(total, row.quantity, "ledger of product {}", row.product_id);
            assert!(row.quantity >= 0);
            if let Some(last) = history.last() {
                assert_eq!(last.final_quantity, row.quantity);
            }
        }
    }
}

#[tokio::test]
async fn create_then_delete_round_trip() {
    let h = TestHarness::new();
    let v1 = h.stock(1, 10).await.version;

    let created = h.take(1, 5).await.unwrap();

    let after_create = h.current(1).await;
    assert_eq!(after_create.quantity, 5);
    assert_ne!(after_create.version, v1);
    assert_eq!(created.order.total_original_cost, Money::from_minor(500));
    assert_eq!(created.order.total_sales_revenue, Money::from_minor(750));
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].original_price, Money::from_minor(100));

    let movements = h.store.list_for_order(created.order.id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].quantity, -5);
    assert_eq!(movements[0].final_quantity, 5);
    assert_eq!(movements[0].importer_name, "alice");

    h.engine
        .delete_order(DeleteOrder::new(alice(), created.order.id))
        .await
        .unwrap();

    let after_delete = h.current(1).await;
    assert_eq!(after_delete.quantity, 10);
    assert_ne!(after_delete.version, after_create.version);

    let history = h.store.list_for_product(ProductId::new(1)).await.unwrap();
    let restore = history.last().unwrap();
    assert_eq!(restore.quantity, 5);
    assert_eq!(restore.final_quantity, 10);
    assert_eq!(restore.reference_id, None);
    assert_eq!(restore.note, FulfillmentConfig::default().restoration_note);

    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.item_count().await, 0);
    h.assert_ledger_balanced().await;
}

#[tokio::test]
async fn insufficient_stock_writes_nothing() {
    let h = TestHarness::new();
    let before = h.stock(1, 3).await;

    let err = h.take(1, 5).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QuantityExceeded);
    assert_eq!(h.current(1).await, before);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.item_count().await, 0);
    assert_eq!(h.store.history_count().await, 1);
}

#[tokio::test]
async fn stale_version_on_one_line_fails_the_whole_order() {
    let h = TestHarness::new();
    let mut cmd = CreateOrder::new(alice(), customer());
    for id in 1..=5 {
        let row = h.stock(id, 10).await;
        cmd = cmd.line(OrderLine::inventory(
            ProductId::new(id),
            1,
            Money::from_minor(10),
            row.version,
        ));
    }
    cmd.lines[2].expected_version = Some(common::VersionToken::new());
    let before = h.store.inventory_rows().await;

    let err = h.engine.create_order(cmd).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    assert!(err.kind().is_retryable());
    assert_eq!(h.store.inventory_rows().await, before);
    assert_eq!(h.store.history_count().await, 5);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.item_count().await, 0);
}

#[tokio::test]
async fn duplicate_lines_fail_before_any_lock() {
    let h = TestHarness::new();
    h.stock(1, 10).await;

    // Hold the product's row lock; validation must not wait for it.
    let mut tx = h.store.begin().await.unwrap();
    h.store
        .get_by_product_for_update(ProductId::new(1), &mut tx)
        .await
        .unwrap();

    let line = OrderLine::external(ProductId::new(1), 1, Money::from_minor(10));
    let cmd = CreateOrder::new(alice(), customer())
        .line(line.clone())
        .line(line);
    let result = tokio::time::timeout(Duration::from_secs(1), h.engine.create_order(cmd))
        .await
        .expect("validation blocked on a row lock");

    assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateOrderItems);
    h.store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn same_product_from_stock_and_externally() {
    let h = TestHarness::new();
    let row = h.stock(2, 4).await;

    let created = h
        .engine
        .create_order(
            CreateOrder::new(alice(), customer())
                .line(OrderLine::inventory(
                    ProductId::new(2),
                    4,
                    Money::from_minor(300),
                    row.version,
                ))
                .line(OrderLine::external(ProductId::new(2), 6, Money::from_minor(300)).with_discount(10)),
        )
        .await
        .unwrap();

    assert_eq!(created.items.len(), 2);
    assert_eq!(created.items[1].export_from, ExportSource::External);
    assert_eq!(created.items[1].final_amount, Some(Money::from_minor(1620)));
    assert_eq!(created.order.total_original_cost, Money::from_minor(2000));
    assert_eq!(created.order.total_sales_revenue, Money::from_minor(2820));
    assert_eq!(h.current(2).await.quantity, 0);
    h.assert_ledger_balanced().await;
}

#[tokio::test]
async fn concurrent_updates_with_one_version_let_one_win() {
    let h = TestHarness::new();
    let row = h.stock(1, 5).await;

    let update = || {
        let inventory = h.inventory.clone();
        let version = row.version;
        async move {
            inventory
                .update_quantity(UpdateQuantity::new(alice(), ProductId::new(1), 1, version))
                .await
        }
    };
    let (a, b) = tokio::join!(update(), update());

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    assert_eq!(h.current(1).await.quantity, 6);
    h.assert_ledger_balanced().await;
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let h = Arc::new(TestHarness::new());
    h.stock(1, 10).await;

    let tasks = (0..20).map(|_| {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            loop {
                match h.take(1, 1).await {
                    Ok(created) => return Some(created.order.id),
                    Err(e) if e.kind().is_retryable() => tokio::task::yield_now().await,
                    Err(e) => {
                        assert_eq!(e.kind(), ErrorKind::QuantityExceeded);
                        return None;
                    }
                }
            }
        })
    });
    let results = join_all(tasks).await;

    let placed = results
        .into_iter()
        .filter_map(|r| r.unwrap())
        .count();
    assert_eq!(placed, 10);
    assert_eq!(h.current(1).await.quantity, 0);
    assert_eq!(h.store.order_count().await, 10);
    h.assert_ledger_balanced().await;
}

#[tokio::test]
async fn auto_split_sources_the_shortfall_externally() {
    let h = TestHarness::with_config(
        FulfillmentConfig::default().with_sourcing_mode(SourcingMode::AutoSplit),
    );
    h.stock(1, 3).await;

    let created = h.take(1, 5).await.unwrap();

    let sources: Vec<_> = created
        .items
        .iter()
        .map(|i| (i.export_from, i.quantity))
        .collect();
    assert_eq!(
        sources,
        vec![(ExportSource::Inventory, 3), (ExportSource::External, 2)]
    );
    assert_eq!(h.current(1).await.quantity, 0);
    assert_eq!(created.order.total_original_cost, Money::from_minor(500));

    h.engine
        .delete_order(DeleteOrder::new(alice(), created.order.id))
        .await
        .unwrap();
    assert_eq!(h.current(1).await.quantity, 3);
    h.assert_ledger_balanced().await;
}

#[tokio::test]
async fn deleting_external_only_order_leaves_inventory_alone() {
    let h = TestHarness::new();
    let before = h.stock(3, 4).await;

    let created = h
        .engine
        .create_order(
            CreateOrder::new(alice(), customer())
                .line(OrderLine::external(ProductId::new(3), 2, Money::from_minor(50))),
        )
        .await
        .unwrap();
    h.engine
        .delete_order(DeleteOrder::new(alice(), created.order.id))
        .await
        .unwrap();

    assert_eq!(h.current(3).await, before);
    assert_eq!(h.store.history_count().await, 1);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn concurrent_deletes_restore_stock_once() {
    let h = TestHarness::new();
    h.stock(1, 10).await;
    let order_id = h.take(1, 4).await.unwrap().order.id;

    let delete = || h.engine.delete_order(DeleteOrder::new(alice(), order_id));
    let (a, b) = tokio::join!(delete(), delete());

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.current(1).await.quantity, 10);
    h.assert_ledger_balanced().await;
}

#[tokio::test]
async fn deleting_missing_order_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .engine
        .delete_order(DeleteOrder::new(alice(), OrderId::new(404)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.field(), Some("order_id"));
}

#[tokio::test]
async fn update_changes_metadata_only() {
    let h = TestHarness::new();
    h.stock(1, 10).await;
    let created = h.take(1, 2).await.unwrap();
    let stock_before = h.current(1).await;

    let mut cmd = UpdateOrder::new(alice(), created.order.id)
        .delivery_status(DeliveryStatus::Completed)
        .debt_status(common::DebtStatus::Paid);
    cmd.additional_cost = Some(Money::from_minor(25));
    let updated = h.engine.update_order(cmd).await.unwrap();

    assert_eq!(updated.delivery_status, DeliveryStatus::Completed);
    assert_eq!(updated.debt_status, Some(common::DebtStatus::Paid));
    assert_eq!(updated.additional_cost, Money::from_minor(25));
    assert!(updated.status_changed_at.is_some());
    assert_eq!(updated.total_original_cost, created.order.total_original_cost);
    assert_eq!(h.current(1).await, stock_before);

    let items = h
        .store
        .get_items(created.order.id, &mut Session::Autonomous)
        .await
        .unwrap();
    assert_eq!(items, created.items);
}

#[tokio::test]
async fn update_without_actor_is_unauthorized() {
    let h = TestHarness::new();
    let err = h
        .engine
        .update_order(UpdateOrder::new(None, OrderId::new(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn dropped_create_leaves_no_trace() {
    let h = TestHarness::new();
    h.stock(1, 10).await;

    // Hold the row lock so the create parks inside its transaction.
    let mut tx = h.store.begin().await.unwrap();
    h.store
        .get_by_product_for_update(ProductId::new(1), &mut tx)
        .await
        .unwrap();

    let cancelled = tokio::time::timeout(Duration::from_millis(50), h.take(1, 2)).await;
    assert!(cancelled.is_err());
    h.store.rollback(tx).await.unwrap();

    assert_eq!(h.current(1).await.quantity, 10);
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.take(1, 2).await.is_ok());
}

#[tokio::test]
async fn overflowing_line_amount_is_rejected_without_side_effects() {
    let h = TestHarness::new();
    h.stock(1, 5).await;

    let err = h
        .engine
        .create_order(CreateOrder::new(alice(), customer()).line(OrderLine::external(
            ProductId::new(1),
            1_000_000_000_000,
            Money::from_minor(100_000_000),
        )))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.field(), Some("lines[0]"));
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.current(1).await.quantity, 5);
}

#[tokio::test]
async fn stock_in_beyond_the_maximum_is_a_bad_request() {
    let h = TestHarness::new();
    let row = h.stock(1, 5).await;

    let err = h
        .inventory
        .update_quantity(UpdateQuantity::new(
            alice(),
            ProductId::new(1),
            i64::MAX,
            row.version,
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.field(), Some("delta"));
    assert_eq!(h.current(1).await, row);
    h.assert_ledger_balanced().await;
}
