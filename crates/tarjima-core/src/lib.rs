// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tarjima bot platform.
//!
//! This crate provides the foundational error type, domain types, and trait
//! definitions shared across the Tarjima workspace. The messenger adapter,
//! storage layer, and supervisor all talk to each other through the types
//! defined here.

pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TarjimaError;
pub use registry::RuntimeRegistry;
pub use traits::{MessengerApi, UpdateHandler};
pub use types::{
    Branch, ChannelId, ConversationState, CustomerKind, InboundUpdate, MessageRef, Order,
    OrderStatus, StaffRole, Tenant, UpdateKind, WebhookStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = TarjimaError::Config("test".into());
        let _storage = TarjimaError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _platform = TarjimaError::Platform {
            message: "test".into(),
            retryable: true,
            source: None,
        };
        let _running = TarjimaError::AlreadyRunning { pid: 42 };
        let _tenant = TarjimaError::TenantNotFound { tenant_id: 7 };
        let _runtime = TarjimaError::RuntimeUnavailable { tenant_id: 7 };
        let _timeout = TarjimaError::Timeout {
            duration: std::time::Duration::from_secs(5),
        };
        let _internal = TarjimaError::Internal("test".into());
    }

    #[test]
    fn order_status_round_trips_through_strings() {
        use std::str::FromStr;

        let variants = [
            OrderStatus::Pending,
            OrderStatus::PaymentPending,
            OrderStatus::PaymentReceived,
            OrderStatus::PaymentConfirmed,
            OrderStatus::InProgress,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed = OrderStatus::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn customer_kind_round_trips_through_strings() {
        use std::str::FromStr;

        assert_eq!(CustomerKind::B2c.to_string(), "b2c");
        assert_eq!(CustomerKind::B2b.to_string(), "b2b");
        assert_eq!(CustomerKind::from_str("b2b").unwrap(), CustomerKind::B2b);
    }

    #[test]
    fn trait_objects_are_constructible() {
        fn _assert_messenger<T: MessengerApi>() {}
        fn _assert_handler<T: UpdateHandler>() {}
    }
}
