//! Ledger service scenario tests
//!
//! Every test runs against a fresh in-memory store, exercising the real
//! transaction paths end to end. The payment gateway is the only mocked
//! dependency.

use std::sync::Arc;

use afta_store::{PoolConfig, Store};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::LedgerError;
use crate::gateway::mock::MockGateway;
use crate::gateway::mint_tx_ref;
use crate::orders::{OrderLine, OrderRequest, OrdersService};
use crate::payments::PaymentsService;
use crate::types::{OrderStatus, TransactionKind};
use crate::wallet::{CreditOutcome, WalletService};

async fn test_store() -> Store {
    Store::connect(&PoolConfig::in_memory())
        .await
        .expect("in-memory store")
}

async fn seed_product(store: &Store, partner_id: i64, name: &str, price: Decimal) -> i64 {
    let result = sqlx::query(
        "INSERT INTO products (partner_id, name, price, is_available) VALUES (?, ?, ?, 1)",
    )
    .bind(partner_id)
    .bind(name)
    .bind(price.to_string())
    .execute(store.pool())
    .await
    .expect("seed product");
    result.last_insert_rowid()
}

async fn mark_unavailable(store: &Store, product_id: i64) {
    sqlx::query("UPDATE products SET is_available = 0 WHERE id = ?")
        .bind(product_id)
        .execute(store.pool())
        .await
        .expect("mark unavailable");
}

/// Sum of a user's ledger entries, which must always equal the balance.
async fn ledger_sum(store: &Store, user_id: i64) -> Decimal {
    let rows = sqlx::query("SELECT amount FROM wallet_transactions WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(store.pool())
        .await
        .expect("ledger rows");
    rows.iter()
        .map(|row| {
            use afta_store::Row;
            row.get::<String, _>("amount").parse::<Decimal>().unwrap()
        })
        .sum()
}

fn order_request(user_id: i64, partner_id: i64, total: Decimal, items: Vec<OrderLine>) -> OrderRequest {
    OrderRequest {
        user_id,
        partner_id,
        total_amount: total,
        items,
        idempotency_key: None,
    }
}

fn line(product_id: i64, quantity: i64) -> OrderLine {
    OrderLine {
        product_id,
        quantity,
        price: None,
    }
}

// ============== Orders ==============

#[tokio::test]
async fn placing_an_order_debits_the_wallet_and_snapshots_prices() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000001", "Abel Tesfaye", dec!(1000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;

    let receipt = orders
        .place_order(order_request(user.id, 7, dec!(250), vec![line(burger, 1)]))
        .await
        .unwrap();

    assert!(!receipt.replayed);
    assert_eq!(receipt.user.wallet_balance, dec!(750));

    let order = orders.get(receipt.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, dec!(250));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].price_per_unit, dec!(250));
    assert_eq!(order.items[0].quantity, 1);

    let entries = wallets.transactions(user.id, 50).await.unwrap();
    let debit = entries
        .iter()
        .find(|t| t.transaction_type == TransactionKind::Payment)
        .expect("order debit entry");
    assert_eq!(debit.amount, dec!(-250));
    assert_eq!(debit.description, format!("Order #{}", receipt.order_id));
    assert_eq!(ledger_sum(&store, user.id).await, dec!(750));
}

#[tokio::test]
async fn insufficient_funds_leaves_no_rows_behind() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000002", "Sara Bekele", dec!(100))
        .await
        .unwrap();
    let pizza = seed_product(&store, 7, "Pizza", dec!(400)).await;

    let err = orders
        .place_order(order_request(user.id, 7, dec!(400), vec![line(pizza, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds));

    // Balance untouched and no order, item, or ledger rows persisted.
    let after = wallets.get_user(user.id).await.unwrap();
    assert_eq!(after.wallet_balance, dec!(100));
    assert!(orders.list_for_user(user.id).await.unwrap().is_empty());
    let entries = wallets.transactions(user.id, 50).await.unwrap();
    assert_eq!(entries.len(), 1, "only the initial deposit remains");
}

#[tokio::test]
async fn stale_client_total_is_rejected_as_price_mismatch() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000003", "Meles Alemu", dec!(1000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(300)).await;

    let err = orders
        .place_order(order_request(user.id, 7, dec!(250), vec![line(burger, 1)]))
        .await
        .unwrap_err();
    match err {
        LedgerError::PriceMismatch { client, actual } => {
            assert_eq!(client, dec!(250));
            assert_eq!(actual, dec!(300));
        }
        other => panic!("expected price mismatch, got {other}"),
    }

    let after = wallets.get_user(user.id).await.unwrap();
    assert_eq!(after.wallet_balance, dec!(1000));
}

#[tokio::test]
async fn unknown_and_unavailable_products_fail_the_order() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000004", "Hanna Girma", dec!(1000))
        .await
        .unwrap();

    let err = orders
        .place_order(order_request(user.id, 7, dec!(100), vec![line(9999, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownProduct(9999)));

    let sambusa = seed_product(&store, 7, "Sambusa", dec!(50)).await;
    mark_unavailable(&store, sambusa).await;
    let err = orders
        .place_order(order_request(user.id, 7, dec!(50), vec![line(sambusa, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownProduct(id) if id == sambusa));
}

#[tokio::test]
async fn multi_line_orders_charge_the_sum_of_catalog_prices() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000005", "Dawit Haile", dec!(2000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;
    let fries = seed_product(&store, 7, "Fries", dec!(75.50)).await;

    let receipt = orders
        .place_order(order_request(
            user.id,
            7,
            dec!(651),
            vec![line(burger, 2), line(fries, 2)],
        ))
        .await
        .unwrap();

    assert_eq!(receipt.user.wallet_balance, dec!(1349));
    let order = orders.get(receipt.order_id).await.unwrap();
    let items_total: Decimal = order
        .items
        .iter()
        .map(|i| i.price_per_unit * Decimal::from(i.quantity))
        .sum();
    assert_eq!(items_total, order.total_amount);
}

#[tokio::test]
async fn idempotency_key_replays_without_a_second_charge() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000006", "Ruth Assefa", dec!(1000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;

    let mut request = order_request(user.id, 7, dec!(250), vec![line(burger, 1)]);
    request.idempotency_key = Some("order-key-1".to_string());

    let first = orders.place_order(request.clone()).await.unwrap();
    let second = orders.place_order(request).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.order_id, second.order_id);
    assert_eq!(second.user.wallet_balance, dec!(750));
    assert_eq!(orders.list_for_user(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_and_nonpositive_quantity_orders_are_rejected() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000007", "Yonas Kebede", dec!(1000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;

    let err = orders
        .place_order(order_request(user.id, 7, dec!(0), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount));

    let err = orders
        .place_order(order_request(user.id, 7, dec!(250), vec![line(burger, 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount));
}

#[tokio::test]
async fn order_status_follows_the_lifecycle() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000008", "Lidya Tadesse", dec!(1000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;
    let receipt = orders
        .place_order(order_request(user.id, 7, dec!(250), vec![line(burger, 1)]))
        .await
        .unwrap();

    // The in-memory pool has a single connection, so the read-back must
    // happen on the connection already held by the update.
    let order = orders
        .update_status(receipt.order_id, OrderStatus::Accepted)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);
    assert_eq!(order.items.len(), 1);

    let stored = orders.get(receipt.order_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Accepted);

    let err = orders
        .update_status(receipt.order_id, OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStatusTransition {
            from: OrderStatus::Accepted,
            to: OrderStatus::Delivered,
        }
    ));

    let err = orders
        .update_status(9999, OrderStatus::Accepted)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OrderNotFound));
}

#[tokio::test]
async fn partner_listing_shows_incoming_orders_newest_first() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000009", "Samuel Worku", dec!(2000))
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;

    let first = orders
        .place_order(order_request(user.id, 7, dec!(250), vec![line(burger, 1)]))
        .await
        .unwrap();
    let second = orders
        .place_order(order_request(user.id, 7, dec!(500), vec![line(burger, 2)]))
        .await
        .unwrap();

    let listing = orders.list_for_partner(7).await.unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].id, second.order_id);
    assert_eq!(listing[1].id, first.order_id);
    assert!(orders.list_for_partner(99).await.unwrap().is_empty());
}

// ============== Transfers ==============

#[tokio::test]
async fn transfer_moves_funds_and_logs_a_matched_pair() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let sender = wallets
        .create_user("+251911000010", "Abel Tesfaye", dec!(500))
        .await
        .unwrap();
    let receiver = wallets
        .create_user("+251911000011", "Sara Bekele", Decimal::ZERO)
        .await
        .unwrap();

    let receipt = wallets
        .transfer(sender.id, "+251911000011", dec!(200))
        .await
        .unwrap();

    assert!(receipt.tx_ref.starts_with("TRF-"));
    assert_eq!(receipt.user.wallet_balance, dec!(300));
    let receiver_after = wallets.get_user(receiver.id).await.unwrap();
    assert_eq!(receiver_after.wallet_balance, dec!(200));

    let debit = wallets.transactions(sender.id, 50).await.unwrap();
    let debit = debit
        .iter()
        .find(|t| t.reference.as_deref() == Some(receipt.tx_ref.as_str()))
        .expect("sender entry");
    assert_eq!(debit.amount, dec!(-200));
    assert_eq!(debit.transaction_type, TransactionKind::Payment);

    let credit = wallets.transactions(receiver.id, 50).await.unwrap();
    let credit = credit
        .iter()
        .find(|t| t.reference.as_deref() == Some(receipt.tx_ref.as_str()))
        .expect("receiver entry");
    assert_eq!(credit.amount, dec!(200));
    assert_eq!(credit.transaction_type, TransactionKind::Topup);
}

#[tokio::test]
async fn transfer_validation_rejects_bad_requests() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let sender = wallets
        .create_user("+251911000012", "Meles Alemu", dec!(100))
        .await
        .unwrap();
    wallets
        .create_user("+251911000013", "Hanna Girma", Decimal::ZERO)
        .await
        .unwrap();

    assert!(matches!(
        wallets.transfer(sender.id, "+251911000013", Decimal::ZERO).await,
        Err(LedgerError::InvalidAmount)
    ));
    assert!(matches!(
        wallets.transfer(sender.id, "+251911000013", dec!(-5)).await,
        Err(LedgerError::InvalidAmount)
    ));
    assert!(matches!(
        wallets.transfer(sender.id, "+251911000012", dec!(50)).await,
        Err(LedgerError::SelfTransfer)
    ));
    assert!(matches!(
        wallets.transfer(sender.id, "+251911999999", dec!(50)).await,
        Err(LedgerError::ReceiverNotFound)
    ));
    assert!(matches!(
        wallets.transfer(9999, "+251911000013", dec!(50)).await,
        Err(LedgerError::SenderNotFound)
    ));
    assert!(matches!(
        wallets.transfer(sender.id, "+251911000013", dec!(500)).await,
        Err(LedgerError::InsufficientFunds)
    ));

    // Nothing moved.
    let after = wallets.get_user(sender.id).await.unwrap();
    assert_eq!(after.wallet_balance, dec!(100));
}

#[tokio::test]
async fn concurrent_opposite_transfers_conserve_the_total() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let a = wallets
        .create_user("+251911000014", "Dawit Haile", dec!(500))
        .await
        .unwrap();
    let b = wallets
        .create_user("+251911000015", "Ruth Assefa", dec!(500))
        .await
        .unwrap();

    let w1 = wallets.clone();
    let w2 = wallets.clone();
    let a_id = a.id;
    let b_id = b.id;
    let t1 = tokio::spawn(async move { w1.transfer(a_id, "+251911000015", dec!(300)).await });
    let t2 = tokio::spawn(async move { w2.transfer(b_id, "+251911000014", dec!(100)).await });

    t1.await.unwrap().unwrap();
    t2.await.unwrap().unwrap();

    let a_after = wallets.get_user(a.id).await.unwrap();
    let b_after = wallets.get_user(b.id).await.unwrap();
    assert_eq!(a_after.wallet_balance, dec!(300));
    assert_eq!(b_after.wallet_balance, dec!(700));
    assert_eq!(
        a_after.wallet_balance + b_after.wallet_balance,
        dec!(1000),
        "transfers must conserve total funds"
    );
    assert_eq!(ledger_sum(&store, a.id).await, a_after.wallet_balance);
    assert_eq!(ledger_sum(&store, b.id).await, b_after.wallet_balance);
}

// ============== Payments ==============

fn payments_fixture(
    store: &Store,
) -> (Arc<MockGateway>, WalletService, PaymentsService) {
    let wallets = WalletService::new(store.clone());
    let gateway = Arc::new(MockGateway::new());
    let payments = PaymentsService::new(
        gateway.clone(),
        wallets.clone(),
        "ETB".to_string(),
        "https://afta.test/callback".to_string(),
    );
    (gateway, wallets, payments)
}

#[tokio::test]
async fn verified_payment_credits_the_wallet_exactly_once() {
    let store = test_store().await;
    let (gateway, wallets, payments) = payments_fixture(&store);

    let user = wallets
        .create_user("+251911000016", "Yonas Kebede", Decimal::ZERO)
        .await
        .unwrap();
    let tx_ref = mint_tx_ref(user.id);
    gateway.confirm(&tx_ref, dec!(500));

    match payments.verify_topup(&tx_ref).await.unwrap() {
        CreditOutcome::Credited(updated) => assert_eq!(updated.wallet_balance, dec!(500)),
        CreditOutcome::AlreadyProcessed => panic!("first verification must credit"),
    }

    // Replaying the same reference is a safe no-op.
    assert!(matches!(
        payments.verify_topup(&tx_ref).await.unwrap(),
        CreditOutcome::AlreadyProcessed
    ));

    let after = wallets.get_user(user.id).await.unwrap();
    assert_eq!(after.wallet_balance, dec!(500));
    let credits = wallets.transactions(user.id, 50).await.unwrap();
    assert_eq!(
        credits
            .iter()
            .filter(|t| t.reference.as_deref() == Some(tx_ref.as_str()))
            .count(),
        1
    );
}

#[tokio::test]
async fn unconfirmed_payment_is_not_credited() {
    let store = test_store().await;
    let (_gateway, wallets, payments) = payments_fixture(&store);

    let user = wallets
        .create_user("+251911000017", "Lidya Tadesse", Decimal::ZERO)
        .await
        .unwrap();
    let tx_ref = mint_tx_ref(user.id);

    let err = payments.verify_topup(&tx_ref).await.unwrap_err();
    assert!(matches!(err, LedgerError::PaymentNotVerified));

    let after = wallets.get_user(user.id).await.unwrap();
    assert_eq!(after.wallet_balance, Decimal::ZERO);
}

#[tokio::test]
async fn malformed_references_are_rejected_before_the_gateway() {
    let store = test_store().await;
    let (_gateway, _wallets, payments) = payments_fixture(&store);

    let err = payments.verify_topup("not-a-reference").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidReference(_)));
}

#[tokio::test]
async fn initialize_topup_opens_a_session_bound_to_the_user() {
    let store = test_store().await;
    let (_gateway, wallets, payments) = payments_fixture(&store);

    let user = wallets
        .create_user("+251911000018", "Samuel Worku", Decimal::ZERO)
        .await
        .unwrap();

    let session = payments
        .initialize_topup(user.id, dec!(250), None, None)
        .await
        .unwrap();
    assert!(session.checkout_url.contains(&session.tx_ref));
    assert_eq!(crate::gateway::parse_tx_ref(&session.tx_ref), Some(user.id));

    assert!(matches!(
        payments
            .initialize_topup(user.id, Decimal::ZERO, None, None)
            .await,
        Err(LedgerError::InvalidAmount)
    ));
    assert!(matches!(
        payments.initialize_topup(9999, dec!(100), None, None).await,
        Err(LedgerError::UserNotFound)
    ));
}

#[tokio::test]
async fn initialize_topup_forwards_caller_contact_details() {
    let store = test_store().await;
    let (gateway, wallets, payments) = payments_fixture(&store);

    let user = wallets
        .create_user("+251911000026", "Lidya Tadesse", Decimal::ZERO)
        .await
        .unwrap();

    payments
        .initialize_topup(
            user.id,
            dec!(100),
            Some("lidya@example.com".to_string()),
            Some("Lidya T".to_string()),
        )
        .await
        .unwrap();
    let sent = gateway.last_session().expect("recorded checkout request");
    assert_eq!(sent.email, "lidya@example.com");
    assert_eq!(sent.first_name, "Lidya");
    assert_eq!(sent.last_name, "T");

    // Absent details fall back to the stored profile.
    payments
        .initialize_topup(user.id, dec!(100), None, None)
        .await
        .unwrap();
    let sent = gateway.last_session().expect("recorded checkout request");
    assert_eq!(sent.email, format!("{}@aftadelivery.com", user.id));
    assert_eq!(sent.first_name, "Lidya");
    assert_eq!(sent.last_name, "Tadesse");
}

#[tokio::test]
async fn simulated_topup_credits_without_a_reference() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let user = wallets
        .create_user("+251911000019", "Abel Tesfaye", dec!(50))
        .await
        .unwrap();

    let updated = wallets
        .simulate_topup(user.id, dec!(100), "Telebirr")
        .await
        .unwrap();
    assert_eq!(updated.wallet_balance, dec!(150));

    let entries = wallets.transactions(user.id, 50).await.unwrap();
    let topup = entries
        .iter()
        .find(|t| t.description.contains("Simulated"))
        .expect("simulated entry");
    assert!(topup.reference.is_none());
    assert_eq!(topup.transaction_type, TransactionKind::Topup);
}

// ============== Wallet bookkeeping ==============

#[tokio::test]
async fn initial_deposit_appears_in_the_ledger() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let funded = wallets
        .create_user("+251911000020", "Sara Bekele", dec!(1000))
        .await
        .unwrap();
    assert_eq!(funded.wallet_balance, dec!(1000));
    let entries = wallets.transactions(funded.id, 50).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].description, "Initial deposit");
    assert_eq!(entries[0].amount, dec!(1000));

    let empty = wallets
        .create_user("+251911000021", "Meles Alemu", Decimal::ZERO)
        .await
        .unwrap();
    assert!(wallets.transactions(empty.id, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn transactions_list_newest_first_and_honor_the_limit() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let user = wallets
        .create_user("+251911000022", "Hanna Girma", dec!(10))
        .await
        .unwrap();
    for i in 1..=4 {
        wallets
            .simulate_topup(user.id, Decimal::from(i), "Telebirr")
            .await
            .unwrap();
    }

    let entries = wallets.transactions(user.id, 3).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].amount, dec!(4));
    assert_eq!(entries[1].amount, dec!(3));
    assert_eq!(entries[2].amount, dec!(2));
}

#[tokio::test]
async fn activation_flips_the_wallet_flag() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());

    let user = wallets
        .create_user("+251911000023", "Dawit Haile", Decimal::ZERO)
        .await
        .unwrap();
    assert!(!user.is_activated);

    let activated = wallets.activate(user.id).await.unwrap();
    assert!(activated.is_activated);

    assert!(matches!(
        wallets.activate(9999).await,
        Err(LedgerError::UserNotFound)
    ));
}

#[tokio::test]
async fn mixed_activity_keeps_ledger_and_balance_in_sync() {
    let store = test_store().await;
    let wallets = WalletService::new(store.clone());
    let orders = OrdersService::new(store.clone());

    let user = wallets
        .create_user("+251911000024", "Ruth Assefa", dec!(1000))
        .await
        .unwrap();
    wallets
        .create_user("+251911000025", "Yonas Kebede", Decimal::ZERO)
        .await
        .unwrap();
    let burger = seed_product(&store, 7, "Burger", dec!(250)).await;

    orders
        .place_order(order_request(user.id, 7, dec!(250), vec![line(burger, 1)]))
        .await
        .unwrap();
    wallets
        .transfer(user.id, "+251911000025", dec!(100))
        .await
        .unwrap();
    wallets
        .simulate_topup(user.id, dec!(75), "Telebirr")
        .await
        .unwrap();

    let after = wallets.get_user(user.id).await.unwrap();
    assert_eq!(after.wallet_balance, dec!(725));
    assert_eq!(ledger_sum(&store, user.id).await, after.wallet_balance);
}
