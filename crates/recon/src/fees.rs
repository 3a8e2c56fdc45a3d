//! Fee routing: (event type, fee type) → aggregate field.

use crate::model::{FeeType, FieldValues, OrderAggregate, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSlot {
    SaleFinal,
    SaleFixed,
    SaleInternational,
    RefundFinal,
    RefundFixed,
}

/// The routing table. Pairs not listed are dropped by the aggregator.
pub fn route_fee(txn_type: &TransactionType, fee_type: &FeeType) -> Option<FeeSlot> {
    match (txn_type, fee_type) {
        (TransactionType::Sale, FeeType::FinalValueFee) => Some(FeeSlot::SaleFinal),
        (TransactionType::Sale, FeeType::FinalValueFeeFixedPerOrder) => Some(FeeSlot::SaleFixed),
        (TransactionType::Sale, FeeType::InternationalFee) => Some(FeeSlot::SaleInternational),
        (TransactionType::Refund, FeeType::FinalValueFee) => Some(FeeSlot::RefundFinal),
        (TransactionType::Refund, FeeType::FinalValueFeeFixedPerOrder) => {
            Some(FeeSlot::RefundFixed)
        }
        _ => None,
    }
}

impl FeeSlot {
    pub fn field_mut(self, agg: &mut OrderAggregate) -> &mut FieldValues {
        match self {
            Self::SaleFinal => &mut agg.sale_final_fee,
            Self::SaleFixed => &mut agg.sale_fixed_fee,
            Self::SaleInternational => &mut agg.sale_international_fee,
            Self::RefundFinal => &mut agg.refund_final_fee,
            Self::RefundFixed => &mut agg.refund_fixed_fee,
        }
    }
}
