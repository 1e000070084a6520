//! Property-based tests for psicash-lib
//!
//! These tests use proptest to verify store invariants across a wide range of inputs.

#[cfg(test)]
mod expiry_properties {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use psicash_lib::{Purchase, PurchaseStore};
    use std::collections::HashMap;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn purchase(id: usize, expiry_secs: Option<i64>) -> Purchase {
        let expiry = expiry_secs.map(|s| epoch() + Duration::seconds(s));
        Purchase {
            transaction_id: format!("tx-{}", id),
            transaction_class: "speed-boost".to_string(),
            distinguisher: "1hr".to_string(),
            server_time_expiry: expiry,
            local_time_expiry: expiry,
            authorization: None,
        }
    }

    proptest! {
        /// Every purchase is reported by exactly one sweep: the first whose
        /// time is past its expiry. Non-expiring purchases are never reported.
        #[test]
        fn expire_reports_each_purchase_once(
            expiries in prop::collection::vec(prop::option::of(0i64..1_000), 0..30),
            mut sweeps in prop::collection::vec(0i64..1_200, 1..10)
        ) {
            sweeps.sort_unstable();

            let mut store = PurchaseStore::new();
            for (i, expiry) in expiries.iter().enumerate() {
                store.record(purchase(i, *expiry));
            }

            let mut reported_at: HashMap<String, i64> = HashMap::new();
            for sweep in &sweeps {
                for p in store.expire(epoch() + Duration::seconds(*sweep)) {
                    prop_assert!(
                        reported_at.insert(p.transaction_id.clone(), *sweep).is_none(),
                        "{} reported twice", p.transaction_id
                    );
                }
            }

            for (i, expiry) in expiries.iter().enumerate() {
                let id = format!("tx-{}", i);
                let first_past = expiry.and_then(|e| sweeps.iter().copied().find(|s| *s > e));
                prop_assert_eq!(reported_at.get(&id).copied(), first_past);
            }

            prop_assert_eq!(store.purchases().len() + store.expired().len(), expiries.len());
        }

        /// Removing the same IDs twice yields nothing the second time.
        #[test]
        fn remove_is_idempotent(
            count in 0usize..20,
            targets in prop::collection::vec(0usize..30, 0..15)
        ) {
            let mut store = PurchaseStore::new();
            for i in 0..count {
                store.record(purchase(i, None));
            }

            let ids: Vec<String> = targets.iter().map(|t| format!("tx-{}", t)).collect();
            let removed = store.remove(&ids);

            let mut expected: Vec<usize> = targets.iter().copied().filter(|t| *t < count).collect();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(removed.len(), expected.len());
            prop_assert_eq!(store.purchases().len(), count - expected.len());

            prop_assert!(store.remove(&ids).is_empty());
        }

        /// Recording the same transaction twice never duplicates it.
        #[test]
        fn record_keeps_ids_unique(ids in prop::collection::vec(0usize..10, 0..40)) {
            let mut store = PurchaseStore::new();
            for id in &ids {
                store.record(purchase(*id, Some(500)));
            }

            let mut unique = ids.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(store.all().count(), unique.len());
        }
    }
}

#[cfg(test)]
mod price_properties {
    use proptest::prelude::*;
    use psicash_lib::{PurchasePrice, PurchaseStore};

    proptest! {
        /// The catalog is sorted by (class, distinguisher) and keys are unique.
        #[test]
        fn catalog_is_sorted_and_unique(
            entries in prop::collection::vec(("[a-c]{1,2}", "[x-z]{1,2}", 0i64..1_000), 0..25)
        ) {
            let mut store = PurchaseStore::new();
            store.replace_prices(
                entries
                    .iter()
                    .map(|(class, dist, price)| PurchasePrice {
                        transaction_class: class.clone(),
                        distinguisher: dist.clone(),
                        price: *price,
                    })
                    .collect(),
            );

            let keys: Vec<(&str, &str)> = store
                .prices()
                .iter()
                .map(|p| (p.transaction_class.as_str(), p.distinguisher.as_str()))
                .collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }

            // Last entry for a key wins.
            for (class, dist, _) in &entries {
                let last = entries
                    .iter()
                    .rev()
                    .find(|(c, d, _)| c == class && d == dist)
                    .map(|(_, _, p)| *p);
                prop_assert_eq!(store.price_for(class, dist), last);
            }
        }
    }
}
