use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a wire value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident: $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant),+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the stable wire/database representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum!(
    /// Delivery progress of an order.
    DeliveryStatus: "delivery status" {
        Pending => "PENDING",
        Delivered => "DELIVERED",
        Unpaid => "UNPAID",
        Completed => "COMPLETED",
    }
);

wire_enum!(
    /// Payment state of an order that was delivered on credit.
    DebtStatus: "debt status" {
        Unpaid => "UNPAID",
        Partial => "PARTIAL",
        Paid => "PAID",
    }
);

wire_enum!(
    /// Where the quantity of an order line came from.
    ExportSource: "export source" {
        /// Deducted from on-hand inventory.
        Inventory => "INVENTORY",
        /// Sourced elsewhere; inventory is not touched.
        External => "EXTERNAL",
    }
);

impl Default for DeliveryStatus {
    fn default() -> Self {
        DeliveryStatus::Pending
    }
}
