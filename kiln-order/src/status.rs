//! Provider status vocabularies mapped onto [`OrderStatus`].
//!
//! `None` means the status is unknown to us. Callers log it and leave the
//! order alone rather than guessing.

use crate::models::OrderStatus;

pub fn map_gelato_status(status: &str) -> Option<OrderStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "created" | "passed" | "pending_approval" | "not_connected" | "on_hold" | "uploading"
        | "draft" | "printed" | "in_production" => Some(OrderStatus::Paid),
        "shipped" | "in_transit" => Some(OrderStatus::Shipped),
        "delivered" => Some(OrderStatus::Delivered),
        "canceled" | "cancelled" => Some(OrderStatus::Canceled),
        "failed" | "returned" => Some(OrderStatus::Failed),
        _ => None,
    }
}

pub fn map_printful_status(status: &str) -> Option<OrderStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "draft" | "pending" | "inprocess" | "onhold" | "inreview" => Some(OrderStatus::Paid),
        "partial" | "fulfilled" => Some(OrderStatus::Shipped),
        "failed" => Some(OrderStatus::Failed),
        "canceled" | "cancelled" => Some(OrderStatus::Canceled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gelato_mapping() {
        assert_eq!(map_gelato_status("in_production"), Some(OrderStatus::Paid));
        assert_eq!(map_gelato_status("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(map_gelato_status("in_transit"), Some(OrderStatus::Shipped));
        assert_eq!(map_gelato_status("delivered"), Some(OrderStatus::Delivered));
        assert_eq!(map_gelato_status("cancelled"), Some(OrderStatus::Canceled));
        assert_eq!(map_gelato_status("returned"), Some(OrderStatus::Failed));
        assert_eq!(map_gelato_status("teleported"), None);
    }

    #[test]
    fn test_printful_mapping() {
        assert_eq!(map_printful_status("inprocess"), Some(OrderStatus::Paid));
        assert_eq!(map_printful_status("fulfilled"), Some(OrderStatus::Shipped));
        assert_eq!(map_printful_status("partial"), Some(OrderStatus::Shipped));
        assert_eq!(map_printful_status("failed"), Some(OrderStatus::Failed));
        assert_eq!(map_printful_status("canceled"), Some(OrderStatus::Canceled));
        assert_eq!(map_printful_status("archived"), None);
    }
}
