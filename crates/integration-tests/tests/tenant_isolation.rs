//! Integration tests for tenant isolation in the scoped store.
//!
//! Two organizations share one database. Nothing one of them does may read,
//! change, delete or link to the other's records, and a failed write must
//! leave nothing behind.
//!
//! These tests require a `PostgreSQL` database in `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p autohaul-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use autohaul_core::{ShipmentStatus, UserRole};
use autohaul_integration_tests::{
    TestDb, member, new_carrier, new_customer, new_shipment, onboard, seed, vehicle_input,
};
use autohaul_server::db::scoped::TenantOwned;
use autohaul_server::db::{Pagination, RepositoryError};
use autohaul_server::models::{
    Carrier, CarrierPatch, Customer, CustomerFilter, CustomerPatch, NewCustomer, Shipment,
    ShipmentPatch, User, UserPatch, Vehicle, VehiclePatch,
};
use autohaul_server::services::tenant::TenantIdentity;

/// Assert that `identity` can neither read, update nor delete the record.
async fn assert_invisible<E, P>(db: &TestDb, identity: &TenantIdentity, id: E::Id, patch: P)
where
    E: TenantOwned,
    P: autohaul_server::db::scoped::EntityPatch<Entity = E>,
{
    let store = db.store();
    assert!(
        matches!(
            store.get::<E>(identity, id).await,
            Err(RepositoryError::NotFound)
        ),
        "get leaked {id}"
    );
    assert!(
        matches!(
            store.update(identity, id, patch).await,
            Err(RepositoryError::NotFound)
        ),
        "update reached {id}"
    );
    assert!(
        matches!(
            store.delete::<E>(identity, id).await,
            Err(RepositoryError::NotFound)
        ),
        "delete reached {id}"
    );
    let page = store
        .list::<E>(identity, &Pagination::default())
        .await
        .unwrap();
    assert!(
        page.items.iter().all(|item| item.id().to_string() != id.to_string()),
        "list leaked {id}"
    );
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_records_are_invisible_to_other_organizations() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;
    let a = seed(&db, &acme.identity, "acme").await;

    assert_invisible::<Customer, _>(
        &db,
        &globex.identity,
        a.customer.id,
        CustomerPatch {
            name: Some("Hijacked".to_owned()),
            ..Default::default()
        },
    )
    .await;
    assert_invisible::<Carrier, _>(
        &db,
        &globex.identity,
        a.carrier.id,
        CarrierPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await;
    assert_invisible::<Shipment, _>(
        &db,
        &globex.identity,
        a.shipment.id,
        ShipmentPatch {
            status: Some(ShipmentStatus::Cancelled),
            ..Default::default()
        },
    )
    .await;
    assert_invisible::<Vehicle, _>(
        &db,
        &globex.identity,
        a.vehicle.id,
        VehiclePatch {
            make: Some("Stolen".to_owned()),
            ..Default::default()
        },
    )
    .await;
    assert_invisible::<User, _>(
        &db,
        &globex.identity,
        acme.owner.id,
        UserPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await;

    // The owner still sees everything, unchanged
    let store = db.store();
    let customer: Customer = store.get(&acme.identity, a.customer.id).await.unwrap();
    assert_eq!(customer.name, "acme customer");
    let shipment: Shipment = store.get(&acme.identity, a.shipment.id).await.unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Assigned);
    assert_eq!(db.count_rows("vehicles").await, 1);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_listings_only_contain_own_records() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;
    seed(&db, &acme.identity, "acme").await;
    seed(&db, &acme.identity, "acme-2").await;
    seed(&db, &globex.identity, "globex").await;

    let store = db.store();
    let page = store
        .list::<Customer>(&acme.identity, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(
        page.items
            .iter()
            .all(|c| c.organization_id == acme.organization.id)
    );

    let page = store
        .list::<Vehicle>(&globex.identity, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items.first().unwrap().make, "globex");

    // A filter cannot widen the scope
    let filter = CustomerFilter {
        q: Some("acme".to_owned()),
    };
    let page = store
        .list_filtered::<Customer>(&globex.identity, &filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());

    let users = store
        .list::<User>(&globex.identity, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(users.total, 1);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_forged_organization_id_is_ignored() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;

    let body = serde_json::json!({
        "name": "Planted record",
        "organization_id": globex.organization.id,
    });
    let new: NewCustomer = serde_json::from_value(body).unwrap();
    let customer = db.store().create(&acme.identity, new).await.unwrap();

    assert_eq!(customer.organization_id, acme.organization.id);
    let page = db
        .store()
        .list::<Customer>(&globex.identity, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_cross_tenant_references_are_rejected_without_writing() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;
    let g = seed(&db, &globex.identity, "globex").await;
    let store = db.store();
    let own_customer = store
        .create(&acme.identity, new_customer("acme customer"))
        .await
        .unwrap();

    let shipments_before = db.count_rows("shipments").await;
    let vehicles_before = db.count_rows("vehicles").await;

    // Shipment for another organization's customer
    let err = store
        .create(&acme.identity, new_shipment(g.customer.id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::CrossTenantReference), "{err:?}");

    // Own customer, foreign carrier
    let err = store
        .create(
            &acme.identity,
            new_shipment(own_customer.id, Some(g.carrier.id)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::CrossTenantReference), "{err:?}");

    // Vehicle on another organization's shipment
    let err = store
        .create(
            &acme.identity,
            vehicle_input("Ford").for_shipment(g.shipment.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::CrossTenantReference), "{err:?}");

    assert_eq!(db.count_rows("shipments").await, shipments_before);
    assert_eq!(db.count_rows("vehicles").await, vehicles_before);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_updates_cannot_link_to_foreign_records() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;
    let a = seed(&db, &acme.identity, "acme").await;
    let g = seed(&db, &globex.identity, "globex").await;
    let store = db.store();

    let err = store
        .update(
            &acme.identity,
            a.shipment.id,
            ShipmentPatch {
                carrier_id: Some(g.carrier.id),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::CrossTenantReference), "{err:?}");

    let err = store
        .update(
            &acme.identity,
            a.vehicle.id,
            VehiclePatch {
                shipment_id: Some(g.shipment.id),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::CrossTenantReference), "{err:?}");

    let shipment: Shipment = store.get(&acme.identity, a.shipment.id).await.unwrap();
    assert_eq!(shipment.carrier_id, Some(a.carrier.id));
    let vehicle: Vehicle = store.get(&acme.identity, a.vehicle.id).await.unwrap();
    assert_eq!(vehicle.shipment_id, a.shipment.id);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_two_dispatch_companies_scenario() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let globex = onboard(&db, "globex").await;
    let (_, dispatcher) = member(&db, &acme, UserRole::Dispatcher).await;
    let store = db.store();

    // Acme's dispatcher books a load end to end
    let customer = store
        .create(&dispatcher.identity, new_customer("Jane Doe"))
        .await
        .unwrap();
    let carrier = store
        .create(&dispatcher.identity, new_carrier("Lone Star Hauling"))
        .await
        .unwrap();
    let shipment = store
        .create(&dispatcher.identity, new_shipment(customer.id, None))
        .await
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Pending);

    let shipment = store
        .update(
            &dispatcher.identity,
            shipment.id,
            ShipmentPatch {
                carrier_id: Some(carrier.id),
                status: Some(ShipmentStatus::Assigned),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Assigned);
    store
        .create(
            &dispatcher.identity,
            vehicle_input("Toyota").for_shipment(shipment.id),
        )
        .await
        .unwrap();

    // Globex sees none of it, not even by id
    assert!(matches!(
        store.get::<Shipment>(&globex.identity, shipment.id).await,
        Err(RepositoryError::NotFound)
    ));
    for total in [
        store
            .list::<Customer>(&globex.identity, &Pagination::default())
            .await
            .unwrap()
            .total,
        store
            .list::<Shipment>(&globex.identity, &Pagination::default())
            .await
            .unwrap()
            .total,
        store
            .list::<Vehicle>(&globex.identity, &Pagination::default())
            .await
            .unwrap()
            .total,
    ] {
        assert_eq!(total, 0);
    }

    // Lifecycle still applies inside the tenant
    let err = store
        .update(
            &dispatcher.identity,
            shipment.id,
            ShipmentPatch {
                status: Some(ShipmentStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, RepositoryError::InvalidTransition { .. }),
        "{err:?}"
    );

    // A customer with shipments cannot be deleted out from under them
    let err = store
        .delete::<Customer>(&dispatcher.identity, customer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)), "{err:?}");

    // Deleting the shipment takes its vehicles with it
    store
        .delete::<Shipment>(&dispatcher.identity, shipment.id)
        .await
        .unwrap();
    assert_eq!(db.count_rows("vehicles").await, 0);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_blocked_write_times_out_and_leaves_nothing_behind() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let store = db.store();
    let customer = store
        .create(&acme.identity, new_customer("Locked"))
        .await
        .unwrap();

    // Another session holds the customer row
    let mut blocker = db.pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM customers WHERE id = $1 FOR UPDATE")
        .bind(customer.id)
        .execute(&mut *blocker)
        .await
        .unwrap();

    let impatient = store.with_timeout(Duration::from_millis(200));
    let err = impatient
        .update(
            &acme.identity,
            customer.id,
            CustomerPatch {
                name: Some("Renamed".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Timeout), "{err:?}");
    assert!(err.is_transient());

    // Linking a shipment share-locks the same row
    let shipments_before = db.count_rows("shipments").await;
    let err = impatient
        .create(&acme.identity, new_shipment(customer.id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Timeout), "{err:?}");

    blocker.rollback().await.unwrap();
    assert_eq!(db.count_rows("shipments").await, shipments_before);
    let unchanged: Customer = store.get(&acme.identity, customer.id).await.unwrap();
    assert_eq!(unchanged.name, "Locked");

    // The same deadline is plenty once the row is free
    impatient
        .create(&acme.identity, new_shipment(customer.id, None))
        .await
        .unwrap();
    assert_eq!(db.count_rows("shipments").await, shipments_before + 1);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires TEST_DATABASE_URL"]
async fn test_inactive_carrier_cannot_be_linked() {
    let db = TestDb::migrated().await;
    let acme = onboard(&db, "acme").await;
    let a = seed(&db, &acme.identity, "acme").await;
    let store = db.store();
    let set_active = |is_active| CarrierPatch {
        is_active: Some(is_active),
        ..Default::default()
    };

    let carrier: Carrier = store
        .update(&acme.identity, a.carrier.id, set_active(false))
        .await
        .unwrap();
    assert!(!carrier.is_active);

    let shipments_before = db.count_rows("shipments").await;
    let err = store
        .create(
            &acme.identity,
            new_shipment(a.customer.id, Some(a.carrier.id)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Invalid(_)), "{err:?}");
    assert_eq!(db.count_rows("shipments").await, shipments_before);

    let pending = store
        .create(&acme.identity, new_shipment(a.customer.id, None))
        .await
        .unwrap();
    let assign = ShipmentPatch {
        carrier_id: Some(a.carrier.id),
        ..Default::default()
    };
    let err = store
        .update(&acme.identity, pending.id, assign.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Invalid(_)), "{err:?}");
    let unchanged: Shipment = store.get(&acme.identity, pending.id).await.unwrap();
    assert_eq!(unchanged.carrier_id, None);

    // Shipments assigned before the deactivation keep their carrier
    let assigned: Shipment = store.get(&acme.identity, a.shipment.id).await.unwrap();
    assert_eq!(assigned.carrier_id, Some(a.carrier.id));

    store
        .update(&acme.identity, a.carrier.id, set_active(true))
        .await
        .unwrap();
    let linked = store
        .update(&acme.identity, pending.id, assign)
        .await
        .unwrap();
    assert_eq!(linked.carrier_id, Some(a.carrier.id));

    db.cleanup().await;
}
