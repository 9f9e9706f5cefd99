//! Reconciliation engine tests: idempotence, stock conservation, and the
//! transition gates, exercised directly against the transactional apply step.

mod common;

use common::*;

#[test]
fn test_duplicate_approved_decrements_stock_once() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, payment) = create_test_order(&conn, &product, None, 3, "flow", "tok_1");
    assert_eq!(payment.status, PaymentStatus::Pending);

    let report = make_report("tok_1", PaymentStatus::Approved, "2");

    // Same approval delivered twice.
    apply_report(&mut conn, "flow", "tok_1", &report).expect("first apply");
    apply_report(&mut conn, "flow", "tok_1", &report).expect("second apply");

    assert_eq!(product_stock(&conn, &product.id), 7, "3 units, decremented exactly once");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Approved);
}

#[test]
fn test_variant_units_multiply_stock_consumption() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 50);
    let six_pack = create_test_variant(&conn, &product.id, "Six pack", 6, 13500);
    let (_, _) = create_test_order(&conn, &product, Some(&six_pack), 2, "flow", "tok_2");

    let report = make_report("tok_2", PaymentStatus::Approved, "2");
    apply_report(&mut conn, "flow", "tok_2", &report).expect("apply");

    // 2 packs of 6 units each.
    assert_eq!(product_stock(&conn, &product.id), 38);
}

#[test]
fn test_chargeback_after_approval_restores_stock() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 20);
    let (order, payment) =
        create_test_order(&conn, &product, None, 5, "mercadopago", "777001");

    let approved = make_report("777001", PaymentStatus::Approved, "approved");
    apply_report(&mut conn, "mercadopago", "777001", &approved).expect("approve");
    assert_eq!(product_stock(&conn, &product.id), 15);

    let chargeback = make_report("777001", PaymentStatus::ChargedBack, "charged_back");
    apply_report(&mut conn, "mercadopago", "777001", &chargeback).expect("chargeback");

    // Net stock change across approve → chargeback is zero.
    assert_eq!(product_stock(&conn, &product.id), 20);

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::ChargedBack);
}

#[test]
fn test_chargeback_restores_stock_only_once() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 20);
    create_test_order(&conn, &product, None, 5, "mercadopago", "777002");

    let approved = make_report("777002", PaymentStatus::Approved, "approved");
    apply_report(&mut conn, "mercadopago", "777002", &approved).expect("approve");

    let chargeback = make_report("777002", PaymentStatus::ChargedBack, "charged_back");
    apply_report(&mut conn, "mercadopago", "777002", &chargeback).expect("first chargeback");
    apply_report(&mut conn, "mercadopago", "777002", &chargeback).expect("second chargeback");

    assert_eq!(product_stock(&conn, &product.id), 20, "Redelivered reversal must not restore twice");
}

#[test]
fn test_unknown_correlation_id_is_ignored() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    create_test_order(&conn, &product, None, 3, "flow", "tok_known");

    let report = make_report("tok_ghost", PaymentStatus::Approved, "2");
    let outcome = apply_report(&mut conn, "flow", "tok_ghost", &report).expect("apply");

    assert!(matches!(outcome, ReconcileOutcome::Ignored));
    assert_eq!(product_stock(&conn, &product.id), 10, "Nothing may be touched");
}

#[test]
fn test_rejection_cancels_pending_order_without_stock_change() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, payment) = create_test_order(&conn, &product, None, 3, "flow", "tok_3");

    let report = make_report("tok_3", PaymentStatus::Rejected, "3");
    apply_report(&mut conn, "flow", "tok_3", &report).expect("apply");

    assert_eq!(product_stock(&conn, &product.id), 10, "Stock was never committed");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Rejected);
}

#[test]
fn test_refund_before_approval_cancels_without_restock() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, _) = create_test_order(&conn, &product, None, 3, "mercadopago", "777003");

    let report = make_report("777003", PaymentStatus::Refunded, "refunded");
    apply_report(&mut conn, "mercadopago", "777003", &report).expect("apply");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(
        product_stock(&conn, &product.id),
        10,
        "No restock for an order that never consumed stock"
    );
}

#[test]
fn test_pending_report_leaves_order_untouched() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, _) = create_test_order(&conn, &product, None, 3, "mercadopago", "777004");

    let report = make_report("777004", PaymentStatus::InProcess, "in_process");
    apply_report(&mut conn, "mercadopago", "777004", &report).expect("apply");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(product_stock(&conn, &product.id), 10);
}

#[test]
fn test_terminal_payment_not_reverted_by_late_pending() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, payment) = create_test_order(&conn, &product, None, 3, "flow", "tok_4");

    let approved = make_report("tok_4", PaymentStatus::Approved, "2");
    apply_report(&mut conn, "flow", "tok_4", &approved).expect("approve");

    // An out-of-order PENDING notification arrives after approval.
    let stale = make_report("tok_4", PaymentStatus::Pending, "1");
    apply_report(&mut conn, "flow", "tok_4", &stale).expect("stale apply");

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Approved, "Terminal status is never reverted");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(product_stock(&conn, &product.id), 7, "Stock untouched by the stale delivery");
}

#[test]
fn test_chargeback_does_not_cancel_delivered_order() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, _) = create_test_order(&conn, &product, None, 2, "mercadopago", "777005");

    let approved = make_report("777005", PaymentStatus::Approved, "approved");
    apply_report(&mut conn, "mercadopago", "777005", &approved).expect("approve");

    // Operator walks the order to DELIVERED before the dispute lands.
    queries::update_order_status(&conn, &order.id, OrderStatus::Delivered).unwrap();

    let chargeback = make_report("777005", PaymentStatus::ChargedBack, "charged_back");
    apply_report(&mut conn, "mercadopago", "777005", &chargeback).expect("chargeback");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Delivered, "DELIVERED is terminal on the gateway path");
    assert_eq!(product_stock(&conn, &product.id), 8, "No restock without a cancel transition");
}

#[test]
fn test_mirror_and_audit_fields_updated() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);
    let (order, payment) = create_test_order(&conn, &product, None, 1, "mercadopago", "777006");

    let mut report = make_report("777006", PaymentStatus::Approved, "approved");
    report.status_detail = Some("accredited".to_string());
    report.payment_method = Some("visa".to_string());
    apply_report(&mut conn, "mercadopago", "777006", &report).expect("apply");

    let order = queries::get_order(&conn, &order.id).unwrap().unwrap();
    assert_eq!(order.payment_status.as_deref(), Some("approved"));
    assert_eq!(order.gateway_reference.as_deref(), Some("777006"));

    let payment = queries::get_payment(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(payment.status_detail.as_deref(), Some("accredited"));
    assert_eq!(payment.payment_method.as_deref(), Some("visa"));
    assert!(payment.raw_response.is_some(), "Raw gateway payload is retained");
}

#[test]
fn test_correlation_id_bound_from_gateway_reference() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Cerveza", 2500, 10);

    // A Mercado Pago checkout: the payment row only knows the preference id;
    // the gateway payment id arrives with the first notification.
    let order = queries::create_order_with_items(
        &conn,
        &queries::NewOrder {
            user_id: "user-1",
            subtotal: 2500,
            shipping: 0,
            currency: "CLP",
            shipping_address_id: None,
        },
        &[queries::NewOrderItem {
            product_id: &product.id,
            product_variant_id: None,
            quantity: 1,
            unit_price: 2500,
        }],
    )
    .unwrap();
    let payment = queries::create_payment(
        &conn,
        &CreatePayment {
            order_id: order.id.clone(),
            provider: "mercadopago".to_string(),
            amount: order.total,
            currency: order.currency.clone(),
        },
    )
    .unwrap();
    queries::set_payment_session(&conn, &payment.id, "pref_123", None).unwrap();

    let mut report = make_report("888001", PaymentStatus::Approved, "approved");
    report.payment_reference = Some(payment.id.clone());

    let outcome = apply_report(&mut conn, "mercadopago", "888001", &report).expect("apply");
    assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));

    // The correlation id is now bound, so redeliveries match directly.
    let bound = queries::get_payment_by_correlation(&conn, "mercadopago", "888001")
        .unwrap()
        .expect("correlation id should be bound");
    assert_eq!(bound.id, payment.id);
    assert_eq!(product_stock(&conn, &product.id), 9);
}
