use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{ItemStatus, OrderItem, VendorPayout};

/// Settlement split applied to each vendor's share of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRates {
    pub commission_rate: Decimal,
    pub service_charge_rate: Decimal,
}

impl Default for PayoutRates {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(10, 2),
            service_charge_rate: Decimal::new(2, 2),
        }
    }
}

/// Derive per-vendor settlement records from an order's items.
///
/// Pure and idempotent: recomputing on an unchanged item set yields
/// identical payouts. Cancelled items never settle.
pub fn compute_payouts(items: &[OrderItem], rates: &PayoutRates) -> Vec<VendorPayout> {
    let mut amounts: BTreeMap<Uuid, Decimal> = BTreeMap::new();

    for item in items {
        if item.status == ItemStatus::Cancelled {
            continue;
        }
        *amounts.entry(item.vendor_id).or_insert(Decimal::ZERO) += item.total_price;
    }

    amounts
        .into_iter()
        .map(|(vendor_id, amount)| {
            let commission = amount * rates.commission_rate;
            let service_charge = amount * rates.service_charge_rate;
            VendorPayout {
                vendor_id,
                amount,
                commission,
                service_charge,
                net_amount: amount - commission - service_charge,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(vendor_id: Uuid, total_price: Decimal, status: ItemStatus) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            vendor_id,
            title: "Cedar Tray".to_string(),
            quantity: 1,
            unit_price: total_price,
            total_price,
            category_surcharge_rate: dec!(0.05),
            status,
        }
    }

    #[test]
    fn payouts_group_by_vendor_with_commission_split() {
        let vendor_a = Uuid::new_v4();
        let vendor_b = Uuid::new_v4();
        let items = vec![
            item(vendor_a, dec!(600), ItemStatus::Confirmed),
            item(vendor_a, dec!(400), ItemStatus::Confirmed),
            item(vendor_b, dec!(200), ItemStatus::Confirmed),
        ];

        let mut payouts = compute_payouts(&items, &PayoutRates::default());
        payouts.sort_by_key(|p| p.amount);

        assert_eq!(payouts.len(), 2);

        let b = &payouts[0];
        assert_eq!(b.vendor_id, vendor_b);
        assert_eq!(b.amount, dec!(200));
        assert_eq!(b.commission, dec!(20));
        assert_eq!(b.service_charge, dec!(4));
        assert_eq!(b.net_amount, dec!(176));

        let a = &payouts[1];
        assert_eq!(a.vendor_id, vendor_a);
        assert_eq!(a.amount, dec!(1000));
        assert_eq!(a.commission, dec!(100));
        assert_eq!(a.service_charge, dec!(20));
        assert_eq!(a.net_amount, dec!(880));
    }

    #[test]
    fn cancelled_items_do_not_settle() {
        let vendor = Uuid::new_v4();
        let items = vec![
            item(vendor, dec!(300), ItemStatus::Confirmed),
            item(vendor, dec!(500), ItemStatus::Cancelled),
        ];

        let payouts = compute_payouts(&items, &PayoutRates::default());
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount, dec!(300));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let vendor = Uuid::new_v4();
        let items = vec![
            item(vendor, dec!(100), ItemStatus::Shipped),
            item(Uuid::new_v4(), dec!(250), ItemStatus::Processing),
        ];

        let first = compute_payouts(&items, &PayoutRates::default());
        let second = compute_payouts(&items, &PayoutRates::default());
        assert_eq!(first, second);
    }

    #[test]
    fn fully_cancelled_order_has_no_payouts() {
        let items = vec![item(Uuid::new_v4(), dec!(100), ItemStatus::Cancelled)];
        assert!(compute_payouts(&items, &PayoutRates::default()).is_empty());
    }
}
